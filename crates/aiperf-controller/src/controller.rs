//! Drives one benchmark run end to end (spec §4.2, §4.3): spawn the
//! planned service processes, gate on registration, push
//! `PROFILE_CONFIGURE`/`PROFILE_START`, monitor heartbeats until credit
//! emission completes, request the final summary, and tear everything
//! down. Grounded on the teacher's `main.rs` bootstrap/shutdown sequence
//! generalized from one process to a fleet of them, plus
//! `server/pool/manager.rs`'s phased-shutdown shape (stop intake, drain,
//! cancel, join).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use aiperf_bus::{BusClient, BusListener, BusServer, CREDITS_COMPLETE_TOPIC, EnvelopeKind, RpcClient};
use aiperf_core::config::{CommBackend, ServiceConfig, UserConfig};
use aiperf_core::error::{AiPerfError, Result};
use aiperf_core::model::{FinalResults, ServiceRegistration};
use aiperf_service::{CONFIGURED_TOPIC, Command, HEARTBEAT_TOPIC, Heartbeat, REGISTER_TOPIC, command_topic};

use crate::registry::Registry;
use crate::spawn::{self, PlannedService, RESULTS_AGGREGATOR, ServiceSpawner, SpawnedProcess};

/// Grace period between observing `CREDITS_COMPLETE_TOPIC` and requesting
/// the final summary, letting in-flight records finish draining through
/// the record processor pool into the aggregator.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// How often the monitor loop re-checks heartbeat staleness while waiting
/// for credits to complete.
const HEARTBEAT_POLL_INTERVAL: Duration = Duration::from_secs(1);

fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

pub struct Controller {
    service_config: ServiceConfig,
}

impl Controller {
    pub fn new(service_config: ServiceConfig) -> Self {
        Self { service_config }
    }

    /// Runs one full benchmark profile and returns the aggregator's final
    /// results. `spawner` is injected so tests (and, eventually, a
    /// `--comm-backend`-agnostic dry-run mode) don't need real OS
    /// processes.
    pub async fn run(&self, user_config: UserConfig, spawner: &dyn ServiceSpawner) -> Result<FinalResults> {
        let listener = self.bind_listener().await?;
        let server = BusServer::new();
        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        let server_task = tokio::spawn(async move {
            let _ = server.run(listener, server_shutdown).await;
        });

        let result = self.run_inner(&user_config, spawner).await;

        shutdown.cancel();
        let _ = server_task.await;
        result
    }

    async fn bind_listener(&self) -> Result<BusListener> {
        match self.service_config.comm_backend {
            CommBackend::Ipc => BusListener::bind_ipc(&self.service_config.bus_addr),
            CommBackend::Tcp => BusListener::bind_tcp(&self.service_config.bus_addr).await,
        }
    }

    async fn run_inner(&self, user_config: &UserConfig, spawner: &dyn ServiceSpawner) -> Result<FinalResults> {
        let mut bus = BusClient::connect(self.service_config.comm_backend, &self.service_config.bus_addr, "controller").await?;
        bus.subscribe(REGISTER_TOPIC).await?;
        bus.subscribe(HEARTBEAT_TOPIC).await?;
        bus.subscribe(CONFIGURED_TOPIC).await?;
        bus.subscribe(CREDITS_COMPLETE_TOPIC).await?;

        let plan = spawn::build_plan(&self.service_config, user_config.load.concurrency);
        info!(services = plan.len(), "spawning service processes");
        let mut processes = self.spawn_all(&plan, spawner)?;

        let mut registry = Registry::new(plan.iter().map(|p| p.service_id.clone()));
        let run_start_ns = now_ns();

        let outcome = self.drive(&mut bus, &plan, user_config, &mut registry, run_start_ns).await;

        for planned in &plan {
            let _ = bus.push(command_topic(&planned.service_id), serde_json::to_value(Command::Stop)?).await;
        }
        self.shutdown_processes(&mut processes);

        outcome
    }

    fn spawn_all(&self, plan: &[PlannedService], spawner: &dyn ServiceSpawner) -> Result<HashMap<String, Box<dyn SpawnedProcess>>> {
        let mut processes = HashMap::new();
        for planned in plan {
            let process = spawner.spawn(planned)?;
            processes.insert(planned.service_id.clone(), process);
        }
        Ok(processes)
    }

    fn shutdown_processes(&self, processes: &mut HashMap<String, Box<dyn SpawnedProcess>>) {
        for (service_id, process) in processes.iter_mut() {
            if let Err(err) = process.kill() {
                warn!(service_id = %service_id, error = %err, "failed to terminate service process");
            }
        }
    }

    /// The registration -> configure -> start -> monitor -> summarize
    /// sequence, isolated from process spawning/teardown so a failure
    /// partway through still lets the caller stop every process.
    async fn drive(
        &self,
        bus: &mut BusClient,
        plan: &[PlannedService],
        user_config: &UserConfig,
        registry: &mut Registry,
        run_start_ns: u64,
    ) -> Result<FinalResults> {
        self.await_registration(bus, registry, run_start_ns).await?;

        for planned in plan {
            bus.push(command_topic(&planned.service_id), serde_json::to_value(Command::Configure(user_config.clone()))?)
                .await?;
        }
        self.await_configured(bus, plan).await?;

        for planned in plan {
            bus.push(command_topic(&planned.service_id), serde_json::to_value(Command::Start)?).await?;
        }
        info!("all services started, run in progress");

        self.monitor_until_complete(bus, registry, run_start_ns).await?;

        tokio::time::sleep(DRAIN_GRACE).await;
        self.request_summary().await
    }

    async fn await_registration(&self, bus: &mut BusClient, registry: &mut Registry, run_start_ns: u64) -> Result<()> {
        let deadline = tokio::time::sleep(Duration::from_secs_f64(self.service_config.registration_timeout_secs));
        tokio::pin!(deadline);
        while !registry.is_fully_registered() {
            tokio::select! {
                _ = &mut deadline => {
                    return Err(AiPerfError::RegistrationTimeout { missing: registry.missing() });
                }
                envelope = bus.recv() => {
                    let Some(envelope) = envelope else {
                        return Err(AiPerfError::transport("bus closed while awaiting registration"));
                    };
                    if envelope.kind != EnvelopeKind::Delivered || envelope.topic != REGISTER_TOPIC {
                        continue;
                    }
                    match serde_json::from_value::<ServiceRegistration>(envelope.payload) {
                        Ok(registration) => {
                            info!(service_id = %registration.service_id, "service registered");
                            registry.record_registration(registration);
                        }
                        Err(err) => warn!(error = %err, "malformed registration envelope"),
                    }
                }
            }
        }
        let _ = run_start_ns;
        Ok(())
    }

    /// Awaits a `CONFIGURED_TOPIC` ack from every planned service (spec
    /// §4.3: "awaits `PROFILE_CONFIGURED` acks").
    async fn await_configured(&self, bus: &mut BusClient, plan: &[PlannedService]) -> Result<()> {
        let mut pending: HashSet<String> = plan.iter().map(|p| p.service_id.clone()).collect();
        let deadline = tokio::time::sleep(Duration::from_secs_f64(self.service_config.command_timeout_secs.max(5.0)));
        tokio::pin!(deadline);
        while !pending.is_empty() {
            tokio::select! {
                _ = &mut deadline => {
                    return Err(AiPerfError::RegistrationTimeout { missing: pending.into_iter().collect() });
                }
                envelope = bus.recv() => {
                    let Some(envelope) = envelope else {
                        return Err(AiPerfError::transport("bus closed while awaiting configure acks"));
                    };
                    if envelope.kind != EnvelopeKind::Delivered || envelope.topic != CONFIGURED_TOPIC {
                        continue;
                    }
                    if let Some(service_id) = envelope.payload.as_str() {
                        pending.remove(service_id);
                    }
                }
            }
        }
        Ok(())
    }

    /// Monitors heartbeats and waits for `CREDITS_COMPLETE_TOPIC` (spec
    /// §4.5 completion criteria). Returns `HeartbeatLost` the first time a
    /// planned service goes stale before credits finish.
    async fn monitor_until_complete(&self, bus: &mut BusClient, registry: &mut Registry, run_start_ns: u64) -> Result<()> {
        let mut staleness_check = tokio::time::interval(HEARTBEAT_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = staleness_check.tick() => {
                    let stale = registry.stale(now_ns(), run_start_ns, self.service_config.heartbeat_timeout_secs);
                    if let Some(service_id) = stale.into_iter().next() {
                        return Err(AiPerfError::HeartbeatLost { service_id });
                    }
                }
                envelope = bus.recv() => {
                    let Some(envelope) = envelope else {
                        return Err(AiPerfError::transport("bus closed while monitoring run"));
                    };
                    if envelope.kind != EnvelopeKind::Delivered {
                        continue;
                    }
                    match envelope.topic.as_str() {
                        HEARTBEAT_TOPIC => {
                            if let Ok(heartbeat) = serde_json::from_value::<Heartbeat>(envelope.payload) {
                                registry.record_heartbeat(&heartbeat.service_id, now_ns());
                            }
                        }
                        CREDITS_COMPLETE_TOPIC => {
                            info!("credit emission complete, draining in-flight requests");
                            return Ok(());
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Requests the final summary from the results aggregator over the
    /// RPC-over-push/pull pattern (spec §4.8), matching the dataset
    /// manager's `GET_CONVERSATION` pattern.
    async fn request_summary(&self) -> Result<FinalResults> {
        let mut rpc = RpcClient::connect(self.service_config.comm_backend, &self.service_config.bus_addr, "controller-rpc").await?;
        let timeout = Duration::from_secs_f64(self.service_config.command_timeout_secs.max(10.0));
        let reply = rpc.request(RESULTS_AGGREGATOR, json!({"cancelled": false}), timeout).await?;
        let final_results = reply
            .get("final_results")
            .cloned()
            .ok_or_else(|| AiPerfError::transport("summarize reply missing final_results"))?;
        serde_json::from_value(final_results).map_err(AiPerfError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_holds_its_service_config() {
        let config = ServiceConfig { registration_timeout_secs: 42.0, ..ServiceConfig::default() };
        let controller = Controller::new(config);
        assert_eq!(controller.service_config.registration_timeout_secs, 42.0);
    }
}
