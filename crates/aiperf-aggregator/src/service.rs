//! The Results Aggregator service (spec §4.8): the sole consumer of
//! `METRICS_TOPIC`/`TELEMETRY_TOPIC`, and the single writer of the final
//! results artifact (spec §5). Summarizes on request (the controller's
//! `SUMMARIZE`, delivered as an RPC call like the dataset manager's
//! `GET_CONVERSATION`) rather than on a fixed schedule.

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use aiperf_bus::{BusClient, EnvelopeKind, FINAL_RESULTS_TOPIC, METRICS_TOPIC, RpcResponder, TELEMETRY_TOPIC, request_topic};
use aiperf_core::config::{ServiceConfig, UserConfig};
use aiperf_core::error::{AiPerfError, Result};
use aiperf_core::model::{FinalResults, TelemetryRecord};
use aiperf_service::Service;

use crate::export;
use crate::store::MetricStore;
use crate::telemetry::TelemetryStore;

pub const SERVICE_TYPE: &str = "results_aggregator";

pub struct ResultsAggregatorService {
    service_config: ServiceConfig,
    service_id: String,
    user_config: Option<UserConfig>,
    bus: Option<BusClient>,
    metrics: MetricStore,
    telemetry: TelemetryStore,
    cancelled: bool,
}

impl ResultsAggregatorService {
    pub fn new(service_id: impl Into<String>, service_config: ServiceConfig) -> Self {
        Self {
            service_config,
            service_id: service_id.into(),
            user_config: None,
            bus: None,
            metrics: MetricStore::new(),
            telemetry: TelemetryStore::new(Vec::new()),
            cancelled: false,
        }
    }

    fn handle_metrics_envelope(&mut self, payload: &Value) {
        let Some(metrics) = payload.get("metrics").and_then(|v| v.as_object()) else { return };
        let dict = metrics
            .iter()
            .filter_map(|(tag, value)| {
                let tag = aiperf_core::metrics::known_tag(tag)?;
                value.as_f64().map(|v| (tag, v))
            })
            .collect();
        let is_warmup = payload.get("is_warmup").and_then(Value::as_bool).unwrap_or(false);
        let error = payload.get("error").and_then(Value::as_str);
        self.metrics.record(&dict, is_warmup, error);
    }

    fn handle_telemetry_envelope(&mut self, payload: Value) {
        match serde_json::from_value::<TelemetryRecord>(payload) {
            Ok(record) => self.telemetry.record(record),
            Err(err) => warn!(service_id = %self.service_id, error = %err, "malformed telemetry envelope"),
        }
    }

    async fn build_final_results(&self) -> FinalResults {
        FinalResults {
            records: self.metrics.summarize(),
            telemetry: Some(self.telemetry.summarize()),
            cancelled: self.cancelled,
            errors: self.metrics.errors().to_vec(),
        }
    }

    /// Writes the JSON/CSV artifacts to `output.artifact_dir` (spec §5:
    /// "the aggregator is the single writer of the final results
    /// artifact"). Failures are logged, matching `ExportError`'s recovery
    /// policy (spec §7): the run's in-memory results are still returned to
    /// the controller even if the disk write fails.
    async fn write_artifacts(&self, results: &FinalResults) {
        let Some(user_config) = &self.user_config else { return };
        let dir = &user_config.output.artifact_dir;
        if let Err(err) = tokio::fs::create_dir_all(dir).await {
            warn!(service_id = %self.service_id, error = %err, "failed to create artifact dir");
            return;
        }

        let json_path = dir.join(&user_config.output.profile_export_file);
        let json_body = export::to_json(user_config, results);
        if let Err(err) = tokio::fs::write(&json_path, json_body.to_string()).await {
            warn!(service_id = %self.service_id, path = %json_path.display(), error = %err, "failed to write results JSON");
        }

        let csv_path = json_path.with_extension("csv");
        let csv_body = export::to_csv(results);
        if let Err(err) = tokio::fs::write(&csv_path, csv_body).await {
            warn!(service_id = %self.service_id, path = %csv_path.display(), error = %err, "failed to write results CSV");
        }
    }
}

#[async_trait]
impl Service for ResultsAggregatorService {
    fn service_type(&self) -> &'static str {
        SERVICE_TYPE
    }

    async fn on_configure(&mut self, user_config: UserConfig) -> Result<()> {
        self.telemetry = TelemetryStore::new(user_config.telemetry.dcgm_urls.clone());
        self.user_config = Some(user_config);
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let bus = BusClient::connect(self.service_config.comm_backend, &self.service_config.bus_addr, self.service_id.clone()).await?;
        bus.pull_register(METRICS_TOPIC).await?;
        bus.pull_register(TELEMETRY_TOPIC).await?;
        bus.pull_register(request_topic(&self.service_id)).await?;
        self.bus = Some(bus);
        Ok(())
    }

    async fn on_run(&mut self, shutdown: CancellationToken) -> Result<()> {
        loop {
            let Some(bus) = self.bus.as_mut() else {
                return Err(AiPerfError::Initialization {
                    service_id: self.service_id.clone(),
                    reason: "on_start did not establish a bus connection".to_string(),
                });
            };
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                envelope = bus.recv() => {
                    let Some(envelope) = envelope else { return Ok(()) };
                    if envelope.kind != EnvelopeKind::PullDelivered {
                        continue;
                    }
                    match envelope.topic.as_str() {
                        METRICS_TOPIC => self.handle_metrics_envelope(&envelope.payload),
                        TELEMETRY_TOPIC => self.handle_telemetry_envelope(envelope.payload),
                        _ => self.handle_summarize_request(envelope.payload).await?,
                    }
                }
            }
        }
    }
}

impl ResultsAggregatorService {
    /// Handles a `SUMMARIZE` RPC request (spec §4.8): computes the final
    /// results, writes artifacts, and replies with the serialized
    /// `FinalResults` so the controller can forward it to the UI/exporters.
    async fn handle_summarize_request(&mut self, payload: Value) -> Result<()> {
        let Some((correlation_id, reply_topic, request)) = RpcResponder::decode(&payload) else {
            return Ok(());
        };
        self.cancelled = request.get("cancelled").and_then(Value::as_bool).unwrap_or(self.cancelled);

        let results = self.build_final_results().await;
        self.write_artifacts(&results).await;

        let reply_payload = json!({"final_results": results});
        let Some(bus) = self.bus.as_ref() else { return Ok(()) };
        RpcResponder::new(bus).reply(&reply_topic, &correlation_id, reply_payload.clone()).await?;

        // Also publish so subscribers other than the requesting controller
        // (e.g. a future UI) can observe completion independently.
        bus.publish(FINAL_RESULTS_TOPIC, reply_payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_service_starts_with_empty_stores() {
        let service = ResultsAggregatorService::new("agg-test", ServiceConfig::default());
        assert_eq!(service.metrics.request_count(), 0);
        assert!(!service.cancelled);
    }
}
