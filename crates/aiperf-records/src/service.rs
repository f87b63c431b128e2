//! The Record Processor service (spec §4.7): one of `result_parser_service_count`
//! processes competing on the `RECORDS` pull topic. Grounded on
//! `services/record_processor/processor.py`'s per-record pipeline:
//! compute metrics, append raw record, forward to the aggregator.

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use aiperf_bus::{BusClient, EnvelopeKind, METRICS_TOPIC, RECORDS_TOPIC};
use aiperf_core::config::{ServiceConfig, UserConfig};
use aiperf_core::error::{AiPerfError, Result};
use aiperf_core::model::ParsedResponseRecord;

use crate::computations::compute_all;
use crate::writer::RawRecordWriter;

pub const SERVICE_TYPE: &str = "record_processor";

pub struct RecordProcessorService {
    service_config: ServiceConfig,
    service_id: String,
    bus: Option<BusClient>,
    writer: Option<RawRecordWriter>,
}

impl RecordProcessorService {
    pub fn new(service_id: impl Into<String>, service_config: ServiceConfig) -> Self {
        Self {
            service_config,
            service_id: service_id.into(),
            bus: None,
            writer: None,
        }
    }

    async fn handle_envelope(&mut self, worker_id: &str, record: ParsedResponseRecord) -> Result<()> {
        let metrics = compute_all(&record);
        let entry = json!({
            "worker_id": worker_id,
            "processor_id": self.service_id,
            "parsed_record": record,
            "metrics": metrics,
        });

        if let Some(writer) = &self.writer {
            writer.append(&entry).await;
        }

        let Some(bus) = self.bus.as_ref() else {
            return Err(AiPerfError::Initialization {
                service_id: self.service_id.clone(),
                reason: "on_start did not establish a bus connection".to_string(),
            });
        };
        bus.push(
            METRICS_TOPIC,
            json!({
                "metrics": metrics,
                "is_warmup": entry["parsed_record"]["is_warmup"],
                "error": record.error,
            }),
        )
        .await
    }
}

#[async_trait]
impl aiperf_service::Service for RecordProcessorService {
    fn service_type(&self) -> &'static str {
        SERVICE_TYPE
    }

    async fn on_configure(&mut self, _user_config: UserConfig) -> Result<()> {
        self.writer = Some(RawRecordWriter::new(&self.service_config.artifact_dir, &self.service_id));
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let bus = BusClient::connect(self.service_config.comm_backend, &self.service_config.bus_addr, self.service_id.clone()).await?;
        bus.pull_register(RECORDS_TOPIC).await?;
        self.bus = Some(bus);
        Ok(())
    }

    async fn on_run(&mut self, shutdown: CancellationToken) -> Result<()> {
        loop {
            let Some(bus) = self.bus.as_mut() else { return Ok(()) };
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                envelope = bus.recv() => {
                    let Some(envelope) = envelope else { return Ok(()) };
                    if envelope.kind != EnvelopeKind::PullDelivered {
                        continue;
                    }
                    let worker_id = envelope.payload.get("worker_id").and_then(serde_json::Value::as_str).unwrap_or("unknown").to_string();
                    let parsed = envelope.payload.get("parsed_record").cloned().unwrap_or_default();
                    let record: ParsedResponseRecord = match serde_json::from_value(parsed) {
                        Ok(record) => record,
                        Err(err) => {
                            warn!(service_id = %self.service_id, error = %err, "malformed records envelope");
                            continue;
                        }
                    };
                    if let Err(err) = self.handle_envelope(&worker_id, record).await {
                        warn!(service_id = %self.service_id, error = %err, "failed to process record");
                    }
                }
            }
        }
    }
}
