//! The Timing Manager service (spec §4.5): the sole producer of `Credit`s,
//! driving whichever of concurrency/request-rate/fixed-schedule mode the
//! benchmark's `UserConfig` resolves to. Grounded on `timing/manager.py`'s
//! `TimingManager`, reworked onto the `Service` trait and the bus's
//! push/pull primitives in place of the original's internal asyncio queues.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;
use tracing::info;

use aiperf_bus::{BusClient, CREDIT_DROP_TOPIC, CREDIT_RETURN_TOPIC, CREDITS_COMPLETE_TOPIC, PROGRESS_TOPIC};
use aiperf_core::config::{LoadConfig, ServiceConfig, TimingMode, UserConfig};
use aiperf_core::error::{AiPerfError, Result};
use aiperf_core::model::Credit;
use aiperf_dataset::load_fixed_schedule;

use crate::cancellation;
use crate::concurrency;
use crate::fixed_schedule::{self, ScheduledDrop};
use crate::rate;

pub const SERVICE_TYPE: &str = "timing_manager";

pub struct TimingManagerService {
    service_config: ServiceConfig,
    service_id: String,
    user_config: Option<UserConfig>,
    bus: Option<BusClient>,
    rng: StdRng,
}

impl TimingManagerService {
    pub fn new(service_id: impl Into<String>, service_config: ServiceConfig) -> Self {
        Self {
            service_config,
            service_id: service_id.into(),
            user_config: None,
            bus: None,
            rng: StdRng::from_rng(&mut rand::rng()),
        }
    }

    fn bus(&mut self) -> Result<&mut BusClient> {
        self.bus.as_mut().ok_or_else(|| AiPerfError::Initialization {
            service_id: self.service_id.clone(),
            reason: "on_start did not establish a bus connection".to_string(),
        })
    }

    async fn drop_credit(
        &mut self,
        conversation_id: Option<String>,
        is_warmup: bool,
        cancellation_rate: f64,
        cancellation_delay_secs: f64,
    ) -> Result<()> {
        let (should_cancel, cancel_after_ns) = cancellation::sample(&mut self.rng, cancellation_rate, cancellation_delay_secs);
        let mut credit = Credit::new(conversation_id.unwrap_or_default(), now_ns(), is_warmup);
        credit.should_cancel = should_cancel;
        credit.cancel_after_ns = cancel_after_ns;
        let payload = serde_json::to_value(&credit)?;
        self.bus()?.push(CREDIT_DROP_TOPIC, payload).await
    }

    /// Publishes `{ start_ns, total, completed }` per spec §4.5: `start_ns`
    /// is the wall-clock time the credit-drop loop began, not the time of
    /// this particular tick.
    async fn publish_progress(&mut self, start_ns: u64, total: usize, completed: usize) -> Result<()> {
        let payload = serde_json::json!({"start_ns": start_ns, "total": total, "completed": completed});
        self.bus()?.publish(PROGRESS_TOPIC, payload).await
    }

    async fn publish_credits_complete(&mut self, cancelled: bool) -> Result<()> {
        let payload = serde_json::json!({"cancelled": cancelled});
        self.bus()?.publish(CREDITS_COMPLETE_TOPIC, payload).await
    }

    /// Drains one `CREDIT_RETURN` envelope if one is already queued, without
    /// blocking; used by the progress/completion accounting loops that would
    /// otherwise starve waiting on a `select!` branch that never fires.
    async fn try_recv_return(&mut self) -> Option<()> {
        let bus = self.bus.as_mut()?;
        match tokio::time::timeout(Duration::from_millis(1), bus.recv()).await {
            Ok(Some(_)) => Some(()),
            _ => None,
        }
    }

    async fn run_concurrency(&mut self, load: &LoadConfig, shutdown: &CancellationToken) -> Result<bool> {
        let total_required = load.request_count + load.warmup_request_count;
        let deadline = load.benchmark_duration_secs.map(Duration::from_secs_f64);
        let start = Instant::now();
        let start_ns = now_ns();
        let mut last_progress = Instant::now();

        let mut dropped = 0usize;
        let mut completed = 0usize;
        let mut in_flight = 0usize;
        let mut warmup_remaining = load.warmup_request_count;

        loop {
            if shutdown.is_cancelled() {
                self.publish_credits_complete(true).await?;
                return Ok(true);
            }
            if let Some(deadline) = deadline {
                if start.elapsed() >= deadline {
                    break;
                }
            }
            if dropped >= total_required && in_flight == 0 {
                break;
            }

            let target = concurrency::target_level(load.concurrency, load.concurrency_ramp_up_secs, start.elapsed().as_secs_f64());
            let due = concurrency::credits_due(in_flight, target, dropped, total_required);
            for _ in 0..due {
                let is_warmup = warmup_remaining > 0;
                if is_warmup {
                    warmup_remaining -= 1;
                }
                self.drop_credit(None, is_warmup, load.request_cancellation_rate, load.request_cancellation_delay_secs)
                    .await?;
                dropped += 1;
                in_flight += 1;
            }

            if last_progress.elapsed().as_secs_f64() >= self.service_config.progress_interval_secs {
                self.publish_progress(start_ns, total_required, completed).await?;
                last_progress = Instant::now();
            }

            if self.try_recv_return().await.is_some() {
                in_flight = in_flight.saturating_sub(1);
                completed += 1;
            } else {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        self.publish_credits_complete(false).await?;
        Ok(false)
    }

    async fn run_request_rate(&mut self, load: &LoadConfig, shutdown: &CancellationToken) -> Result<bool> {
        let total_required = load.request_count + load.warmup_request_count;
        let rate = load.request_rate.unwrap_or(1.0);
        let offsets = rate::schedule_offsets(load.request_rate_mode, rate, total_required, &mut self.rng);
        let deadline = load.benchmark_duration_secs.map(Duration::from_secs_f64);
        let start = Instant::now();
        let start_ns = now_ns();
        let mut last_progress = Instant::now();
        let mut warmup_remaining = load.warmup_request_count;

        for offset in offsets {
            if shutdown.is_cancelled() {
                self.publish_credits_complete(true).await?;
                return Ok(true);
            }
            if let Some(deadline) = deadline {
                if start.elapsed() >= deadline {
                    break;
                }
            }
            let target = Duration::from_secs_f64(offset);
            if let Some(remaining) = target.checked_sub(start.elapsed()) {
                tokio::select! {
                    _ = tokio::time::sleep(remaining) => {}
                    _ = shutdown.cancelled() => {
                        self.publish_credits_complete(true).await?;
                        return Ok(true);
                    }
                }
            }

            let is_warmup = warmup_remaining > 0;
            if is_warmup {
                warmup_remaining -= 1;
            }
            self.drop_credit(None, is_warmup, load.request_cancellation_rate, load.request_cancellation_delay_secs)
                .await?;

            if last_progress.elapsed().as_secs_f64() >= self.service_config.progress_interval_secs {
                self.publish_progress(start_ns, total_required, 0).await?;
                last_progress = Instant::now();
            }
        }

        self.publish_credits_complete(false).await?;
        Ok(false)
    }

    async fn run_fixed_schedule(&mut self, input_file: &std::path::Path, shutdown: &CancellationToken) -> Result<bool> {
        let entries = load_fixed_schedule(input_file)?;
        let schedule: Vec<ScheduledDrop> = fixed_schedule::resolve(&entries);
        let total_required = schedule.len();
        let start = Instant::now();
        let start_ns = now_ns();
        let mut last_progress = Instant::now();

        for drop in schedule {
            if shutdown.is_cancelled() {
                self.publish_credits_complete(true).await?;
                return Ok(true);
            }
            let target = Duration::from_nanos(drop.drop_offset_ns);
            if let Some(remaining) = target.checked_sub(start.elapsed()) {
                tokio::select! {
                    _ = tokio::time::sleep(remaining) => {}
                    _ = shutdown.cancelled() => {
                        self.publish_credits_complete(true).await?;
                        return Ok(true);
                    }
                }
            }

            let mut credit = Credit::new(drop.session_id.unwrap_or_default(), now_ns(), false);
            credit.should_cancel = drop.should_cancel;
            credit.cancel_after_ns = drop.cancel_after_ns;
            let payload = serde_json::to_value(&credit)?;
            self.bus()?.push(CREDIT_DROP_TOPIC, payload).await?;

            if last_progress.elapsed().as_secs_f64() >= self.service_config.progress_interval_secs {
                self.publish_progress(start_ns, total_required, 0).await?;
                last_progress = Instant::now();
            }
        }

        self.publish_credits_complete(false).await?;
        Ok(false)
    }
}

#[async_trait]
impl aiperf_service::Service for TimingManagerService {
    fn service_type(&self) -> &'static str {
        SERVICE_TYPE
    }

    fn required_clients(&self) -> Vec<String> {
        vec!["worker".to_string(), "dataset_manager".to_string()]
    }

    async fn on_configure(&mut self, user_config: UserConfig) -> Result<()> {
        if let Some(seed) = user_config.input.random_seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.user_config = Some(user_config);
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let bus = BusClient::connect(self.service_config.comm_backend, &self.service_config.bus_addr, self.service_id.clone()).await?;
        bus.pull_register(CREDIT_RETURN_TOPIC).await?;
        self.bus = Some(bus);
        Ok(())
    }

    async fn on_run(&mut self, shutdown: CancellationToken) -> Result<()> {
        let Some(user_config) = self.user_config.clone() else {
            return Err(AiPerfError::Initialization {
                service_id: self.service_id.clone(),
                reason: "on_run invoked before PROFILE_CONFIGURE".to_string(),
            });
        };
        let has_input_file = user_config.input.is_fixed_schedule();
        let mode = user_config.load.timing_mode(has_input_file);

        info!(service_id = %self.service_id, ?mode, "starting credit emission");

        let cancelled = match mode {
            TimingMode::Concurrency => self.run_concurrency(&user_config.load, &shutdown).await?,
            TimingMode::RequestRate => self.run_request_rate(&user_config.load, &shutdown).await?,
            TimingMode::FixedSchedule => {
                let file = user_config.input.file.clone().ok_or_else(|| {
                    AiPerfError::configuration("fixed-schedule mode requires --input-file")
                })?;
                self.run_fixed_schedule(&file, &shutdown).await?
            }
        };

        info!(service_id = %self.service_id, cancelled, "credit emission complete");
        Ok(())
    }
}

fn now_ns() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ns_increases_monotonically_enough() {
        let a = now_ns();
        std::thread::sleep(Duration::from_millis(1));
        let b = now_ns();
        assert!(b > a);
    }

    #[tokio::test]
    async fn progress_ticker_does_not_panic_without_a_bus() {
        let mut service = TimingManagerService::new("timing-test", ServiceConfig::default());
        assert!(service.publish_progress(0, 0, 0).await.is_err());
    }
}
