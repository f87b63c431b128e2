//! The Telemetry Manager service (spec §4.9): owns one [`Collector`] per
//! configured `dcgm_url`, forwarding every sampled `TelemetryRecord` onto
//! the bus for the results aggregator to fold into the final hierarchy.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use aiperf_bus::{BusClient, TELEMETRY_TOPIC};
use aiperf_core::config::{ServiceConfig, UserConfig};
use aiperf_core::error::Result;
use aiperf_core::model::TelemetryRecord;
use aiperf_service::Service;

use crate::collector::Collector;

pub const SERVICE_TYPE: &str = "telemetry_manager";

pub struct TelemetryManagerService {
    service_config: ServiceConfig,
    service_id: String,
    dcgm_urls: Vec<String>,
    collection_interval_secs: f64,
    bus: Option<BusClient>,
}

impl TelemetryManagerService {
    pub fn new(service_id: impl Into<String>, service_config: ServiceConfig) -> Self {
        Self {
            service_config,
            service_id: service_id.into(),
            dcgm_urls: Vec::new(),
            collection_interval_secs: 1.0,
            bus: None,
        }
    }
}

#[async_trait]
impl Service for TelemetryManagerService {
    fn service_type(&self) -> &'static str {
        SERVICE_TYPE
    }

    async fn on_configure(&mut self, user_config: UserConfig) -> Result<()> {
        self.dcgm_urls = user_config.telemetry.dcgm_urls.clone();
        self.collection_interval_secs = user_config.telemetry.collection_interval_secs.max(0.1);
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        if self.dcgm_urls.is_empty() {
            return Ok(());
        }
        let bus = BusClient::connect(self.service_config.comm_backend, &self.service_config.bus_addr, self.service_id.clone()).await?;
        self.bus = Some(bus);
        Ok(())
    }

    async fn on_run(&mut self, shutdown: CancellationToken) -> Result<()> {
        if self.dcgm_urls.is_empty() {
            shutdown.cancelled().await;
            return Ok(());
        }
        let Some(bus) = self.bus.take() else {
            shutdown.cancelled().await;
            return Ok(());
        };

        let (record_tx, mut record_rx) = mpsc::channel::<TelemetryRecord>(1024);
        let mut collector_tasks = Vec::new();
        for url in &self.dcgm_urls {
            let collector = Collector::new(url.clone());
            let interval_secs = self.collection_interval_secs;
            let collector_shutdown = shutdown.child_token();
            let tx = record_tx.clone();
            collector_tasks.push(tokio::spawn(async move {
                collector
                    .run(interval_secs, collector_shutdown, |record| {
                        let _ = tx.try_send(record);
                    })
                    .await;
            }));
        }
        drop(record_tx);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = record_rx.recv() => {
                    let Some(record) = received else { break };
                    if let Ok(payload) = serde_json::to_value(&record) {
                        if let Err(err) = bus.push(TELEMETRY_TOPIC, payload).await {
                            warn!(service_id = %self.service_id, error = %err, "failed to push telemetry record");
                        }
                    }
                }
            }
        }

        for task in collector_tasks {
            task.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_telemetry_has_no_urls_configured() {
        let service = TelemetryManagerService::new("telemetry-test", ServiceConfig::default());
        assert!(service.dcgm_urls.is_empty());
    }
}
