//! One long-lived collector per `dcgm_url` (spec §4.9): polls on
//! `collection_interval`, parses the Prometheus response, and folds the
//! per-metric samples for each GPU UUID present into one [`TelemetryRecord`]
//! per poll.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use tracing::warn;

use aiperf_core::model::TelemetryRecord;

use crate::prometheus::{self, Sample};

pub struct Collector {
    url: String,
    client: reqwest::Client,
}

impl Collector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Runs until `shutdown` fires, invoking `on_record` for every GPU
    /// sampled on each poll. Network/parse failures are logged and produce
    /// zero records for that poll rather than stopping the collector (spec
    /// §4.9: "never fatal").
    pub async fn run<F>(&self, interval_secs: f64, shutdown: CancellationToken, mut on_record: F)
    where
        F: FnMut(TelemetryRecord),
    {
        let mut ticker = tokio::time::interval(Duration::from_secs_f64(interval_secs.max(0.1)));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    for record in self.poll_once().await {
                        on_record(record);
                    }
                }
            }
        }
    }

    async fn poll_once(&self) -> Vec<TelemetryRecord> {
        let body = match self.client.get(&self.url).send().await {
            Ok(response) => match response.error_for_status() {
                Ok(response) => match response.text().await {
                    Ok(body) => body,
                    Err(err) => {
                        warn!(url = %self.url, error = %err, "telemetry response body read failed");
                        return Vec::new();
                    }
                },
                Err(err) => {
                    warn!(url = %self.url, error = %err, "telemetry endpoint returned an error status");
                    return Vec::new();
                }
            },
            Err(err) => {
                warn!(url = %self.url, error = %err, "telemetry endpoint unreachable");
                return Vec::new();
            }
        };

        let samples = prometheus::parse(&body);
        if samples.is_empty() {
            return Vec::new();
        }
        fold_samples(&self.url, now_ns(), samples)
    }
}

/// Groups a poll's flat sample list by GPU UUID into one record per GPU.
fn fold_samples(dcgm_url: &str, timestamp_ns: u64, samples: Vec<Sample>) -> Vec<TelemetryRecord> {
    let mut by_gpu: HashMap<String, TelemetryRecord> = HashMap::new();

    for sample in samples {
        let record = by_gpu.entry(sample.gpu_uuid.clone()).or_insert_with(|| TelemetryRecord {
            timestamp_ns,
            dcgm_url: dcgm_url.to_string(),
            gpu_index: sample.gpu_index,
            gpu_uuid: sample.gpu_uuid.clone(),
            model_name: sample.model_name.clone(),
            pci_bus_id: sample.pci_bus_id.clone(),
            device: sample.device.clone(),
            hostname: sample.hostname.clone(),
            power_usage: None,
            power_limit: None,
            energy_consumption: None,
            utilization: None,
            memory_used_gb: None,
            memory_total_gb: None,
            temperature: None,
        });
        apply_metric(record, sample.metric, sample.value);
    }

    by_gpu.into_values().collect()
}

fn apply_metric(record: &mut TelemetryRecord, metric: &str, value: f64) {
    match metric {
        "power_usage" => record.power_usage = Some(value),
        "power_limit" => record.power_limit = Some(value),
        "energy_consumption" => record.energy_consumption = Some(value),
        "utilization" => record.utilization = Some(value),
        "memory_used_gb" => record.memory_used_gb = Some(value),
        "memory_total_gb" => record.memory_total_gb = Some(value),
        "temperature" => record.temperature = Some(value),
        // sm_clock/mem_clock/memory_temp are parsed but have no dedicated
        // TelemetryRecord field; spec §3's record shape only names the
        // fields above, so these are intentionally dropped here.
        _ => {}
    }
}

fn now_ns() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(uuid: &str, metric: &'static str, value: f64) -> Sample {
        Sample {
            gpu_uuid: uuid.to_string(),
            gpu_index: 0,
            model_name: Some("H100".to_string()),
            pci_bus_id: None,
            device: None,
            hostname: None,
            metric,
            value,
        }
    }

    #[test]
    fn folds_multiple_metrics_for_one_gpu_into_one_record() {
        let samples = vec![sample("gpu-0", "power_usage", 300.0), sample("gpu-0", "utilization", 80.0)];
        let records = fold_samples("http://a", 1, samples);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].power_usage, Some(300.0));
        assert_eq!(records[0].utilization, Some(80.0));
    }

    #[test]
    fn separate_gpus_yield_separate_records() {
        let samples = vec![sample("gpu-0", "power_usage", 1.0), sample("gpu-1", "power_usage", 2.0)];
        let records = fold_samples("http://a", 1, samples);
        assert_eq!(records.len(), 2);
    }
}
