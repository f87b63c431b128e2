//! Drives a `Service` through its lifecycle, emits heartbeats, and wires up
//! graceful shutdown. Grounded on the teacher's `main.rs` (signal-based
//! shutdown awaiting ctrl_c/SIGTERM, flushing telemetry before exit) and
//! `server/pool/manager.rs`'s phased shutdown (stop accepting, drain,
//! cancel, ack).

use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use aiperf_bus::{BusClient, EnvelopeKind};
use aiperf_core::config::{ServiceConfig, UserConfig};
use aiperf_core::error::Result;
use aiperf_core::model::{ServiceRegistration, ServiceState};

use crate::lifecycle::Service;
use crate::state::transition;

/// Topic every service publishes its heartbeat to; the controller
/// subscribes once and demultiplexes by `service_id` in the payload.
pub const HEARTBEAT_TOPIC: &str = "svc.heartbeat";
/// Topic a service publishes `ServiceRegistration` to once connected
/// (spec §4.2 step 2: "Sends `REGISTER` ... to the controller").
pub const REGISTER_TOPIC: &str = "svc.register";
/// Topic a service publishes to after applying `PROFILE_CONFIGURE`
/// (spec §4.3: "Awaits `PROFILE_CONFIGURED` acks"), payload is the
/// `service_id` string.
pub const CONFIGURED_TOPIC: &str = "svc.configured";
/// Per-service pull topic the controller pushes commands onto, named
/// `svc.command.<service_id>`.
pub fn command_topic(service_id: &str) -> String {
    format!("svc.command.{service_id}")
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Heartbeat {
    pub service_id: String,
    pub service_type: String,
    pub state: ServiceState,
    pub pid: u32,
}

/// Commands the controller routes to a service's command topic (spec §4.2:
/// "a command dispatcher routes inbound `COMMAND` messages to handler
/// methods by command name"). `Configure` carries the validated
/// `UserConfig` the original sends as `PROFILE_CONFIGURE { user_config }`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Configure(UserConfig),
    Start,
    Stop,
    Cancel,
}

pub struct ServiceRuntime<S: Service> {
    service_id: String,
    config: ServiceConfig,
    bus: BusClient,
    service: S,
    state: ServiceState,
}

impl<S: Service> ServiceRuntime<S> {
    pub async fn new(service_id: impl Into<String>, config: ServiceConfig, service: S) -> Result<Self> {
        let service_id = service_id.into();
        let bus = BusClient::connect(config.comm_backend, &config.bus_addr, service_id.clone()).await?;
        bus.pull_register(command_topic(&service_id)).await?;
        Ok(Self {
            service_id,
            config,
            bus,
            service,
            state: ServiceState::Created,
        })
    }

    fn goto(&mut self, next: ServiceState) -> Result<()> {
        transition(&mut self.state, next, &self.service_id)
    }

    /// Runs the full lifecycle to completion: init, start, run-until-shutdown,
    /// stop, cleanup. Returns the terminal error, if any, so the caller can
    /// map it to a process exit code.
    pub async fn run(mut self) -> Result<()> {
        let shutdown = CancellationToken::new();
        let result = self.run_inner(shutdown).await;
        if let Err(err) = &result {
            error!(service_id = %self.service_id, error = %err, "service failed");
            self.state = ServiceState::Failed;
        }
        result
    }

    async fn run_inner(&mut self, shutdown: CancellationToken) -> Result<()> {
        self.goto(ServiceState::Initializing)?;
        self.service.on_init().await?;
        self.goto(ServiceState::Initialized)?;

        self.register().await?;

        let signal_shutdown = shutdown.clone();
        let signal_task = tokio::spawn(async move {
            wait_for_signal().await;
            signal_shutdown.cancel();
        });

        let run_result = self.run_until_shutdown(shutdown.clone()).await;

        shutdown.cancel();
        signal_task.abort();

        self.goto(ServiceState::Stopping)?;
        self.service.on_stop().await?;
        self.goto(ServiceState::Stopped)?;
        self.service.on_cleanup().await?;
        self.goto(ServiceState::CleanedUp)?;

        run_result
    }

    /// Publishes `ServiceRegistration` so the controller can track this
    /// process (spec §4.2 step 2).
    async fn register(&self) -> Result<()> {
        let registration = ServiceRegistration {
            service_id: self.service_id.clone(),
            service_type: self.service.service_type().to_string(),
            pid: std::process::id(),
            state: ServiceState::Initialized,
            last_heartbeat_ns: 0,
            required_clients: self.service.required_clients(),
        };
        self.bus.publish(REGISTER_TOPIC, serde_json::to_value(&registration)?).await
    }

    /// Waits for `Configure` then `Start`, runs `on_run` to completion while
    /// a sibling task watches for `Stop`/`Cancel`, matching spec §4.2's
    /// "subscribes to its command topic and awaits `PROFILE_CONFIGURE`"
    /// followed by `PROFILE_START`.
    async fn run_until_shutdown(&mut self, shutdown: CancellationToken) -> Result<()> {
        loop {
            match self.poll_commands().await {
                Some(Command::Configure(user_config)) => {
                    self.service.on_configure(user_config).await?;
                    self.bus
                        .publish(CONFIGURED_TOPIC, serde_json::Value::String(self.service_id.clone()))
                        .await?;
                }
                Some(Command::Start) => break,
                Some(Command::Stop) | Some(Command::Cancel) => {
                    info!(service_id = %self.service_id, "stopped before start command arrived");
                    return Ok(());
                }
                None => return Ok(()),
            }
        }

        self.goto(ServiceState::Starting)?;
        self.service.on_start().await?;
        self.goto(ServiceState::Running)?;

        let heartbeat_shutdown = shutdown.child_token();
        let heartbeat_task = self.spawn_heartbeat(heartbeat_shutdown.clone());

        let run_result = tokio::select! {
            result = self.service.on_run(shutdown.child_token()) => result,
            _ = self.watch_for_stop() => Ok(()),
            _ = shutdown.cancelled() => Ok(()),
        };

        heartbeat_shutdown.cancel();
        let _ = heartbeat_task.await;
        run_result
    }

    /// Polls the command topic until `Stop` or `Cancel` arrives, ignoring
    /// stray `Configure`/`Start` repeats.
    async fn watch_for_stop(&mut self) {
        loop {
            match self.poll_commands().await {
                Some(Command::Stop) | Some(Command::Cancel) | None => return,
                _ => continue,
            }
        }
    }

    async fn poll_commands(&mut self) -> Option<Command> {
        loop {
            let envelope = self.bus.recv().await?;
            if envelope.kind != EnvelopeKind::PullDelivered {
                continue;
            }
            match serde_json::from_value::<Command>(envelope.payload) {
                Ok(cmd) => return Some(cmd),
                Err(err) => warn!(error = %err, "malformed command envelope"),
            }
        }
    }

    fn spawn_heartbeat(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let interval_secs = self.config.heartbeat_interval_secs.max(0.1);
        let service_id = self.service_id.clone();
        let service_type = self.service.service_type().to_string();
        let pid = std::process::id();
        let config = self.config.clone();

        // A dedicated bus connection: `BusClient` isn't `Clone` and the main
        // connection is busy polling commands on `self.bus`.
        tokio::spawn(async move {
            let client = match BusClient::connect(config.comm_backend, &config.bus_addr, service_id.clone()).await {
                Ok(c) => c,
                Err(err) => {
                    warn!(error = %err, "heartbeat connection failed");
                    return;
                }
            };
            let mut ticker = interval(Duration::from_secs_f64(interval_secs));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => {
                        let heartbeat = Heartbeat {
                            service_id: service_id.clone(),
                            service_type: service_type.clone(),
                            state: ServiceState::Running,
                            pid,
                        };
                        if let Ok(payload) = serde_json::to_value(&heartbeat) {
                            let _ = client.publish(HEARTBEAT_TOPIC, payload).await;
                        }
                    }
                }
            }
        })
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
