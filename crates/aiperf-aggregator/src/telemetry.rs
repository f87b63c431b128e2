//! Telemetry hierarchy aggregation (spec §4.9, §6): per-`dcgm_url`
//! reachability plus per-GPU metric series, built from the stream of
//! `TelemetryRecord`s forwarded by the telemetry collector.

use std::collections::HashMap;

use aiperf_core::metrics;
use aiperf_core::model::{GpuMetadata, MetricSeries, TelemetryEndpointSummary, TelemetryGpuSummary, TelemetryHierarchy, TelemetryRecord};

/// `(metric name, field accessor)` pairs mirroring `TelemetryRecord`'s
/// optional numeric fields, already unit-scaled by the collector.
const GPU_METRIC_FIELDS: &[(&str, fn(&TelemetryRecord) -> Option<f64>)] = &[
    ("gpu_power_usage", |r| r.power_usage),
    ("gpu_power_limit", |r| r.power_limit),
    ("gpu_energy_consumption", |r| r.energy_consumption),
    ("gpu_utilization", |r| r.utilization),
    ("gpu_memory_used", |r| r.memory_used_gb),
    ("gpu_memory_total", |r| r.memory_total_gb),
    ("gpu_temperature", |r| r.temperature),
];

pub struct TelemetryStore {
    configured_urls: Vec<String>,
    reachable: HashMap<String, bool>,
    metadata: HashMap<String, HashMap<String, GpuMetadata>>,
    series: HashMap<String, HashMap<String, HashMap<&'static str, MetricSeries>>>,
}

impl TelemetryStore {
    /// `configured_urls` is the set of `dcgm_url`s the telemetry collector
    /// was told to poll; any url with zero samples by the time of
    /// `summarize` is reported unreachable rather than silently omitted.
    pub fn new(configured_urls: Vec<String>) -> Self {
        let reachable = configured_urls.iter().map(|url| (url.clone(), false)).collect();
        Self {
            configured_urls,
            reachable,
            metadata: HashMap::new(),
            series: HashMap::new(),
        }
    }

    pub fn record(&mut self, sample: TelemetryRecord) {
        self.reachable.insert(sample.dcgm_url.clone(), true);

        let gpu_meta = self
            .metadata
            .entry(sample.dcgm_url.clone())
            .or_default()
            .entry(sample.gpu_uuid.clone())
            .or_insert_with(|| GpuMetadata {
                gpu_index: sample.gpu_index,
                model_name: sample.model_name.clone(),
                pci_bus_id: sample.pci_bus_id.clone(),
                hostname: sample.hostname.clone(),
            });
        let _ = gpu_meta;

        let per_gpu = self.series.entry(sample.dcgm_url.clone()).or_default().entry(sample.gpu_uuid.clone()).or_default();
        for (name, getter) in GPU_METRIC_FIELDS {
            if let Some(value) = getter(&sample) {
                per_gpu.entry(name).or_default().push(value, sample.timestamp_ns);
            }
        }
    }

    pub fn summarize(&self) -> TelemetryHierarchy {
        let mut endpoints = HashMap::new();
        for url in &self.configured_urls {
            let reachable = self.reachable.get(url).copied().unwrap_or(false);
            let mut gpus = HashMap::new();
            if let Some(per_gpu) = self.metadata.get(url) {
                for (gpu_uuid, meta) in per_gpu {
                    let metrics_map = self
                        .series
                        .get(url)
                        .and_then(|m| m.get(gpu_uuid))
                        .map(|series_map| {
                            series_map
                                .iter()
                                .map(|(name, series)| ((*name).to_string(), metrics::summarize(name, &series.values)))
                                .collect()
                        })
                        .unwrap_or_default();
                    gpus.insert(
                        gpu_uuid.clone(),
                        TelemetryGpuSummary {
                            gpu_index: meta.gpu_index,
                            gpu_name: meta.model_name.clone(),
                            metrics: metrics_map,
                        },
                    );
                }
            }
            endpoints.insert(url.clone(), TelemetryEndpointSummary { reachable, gpus });
        }
        TelemetryHierarchy { endpoints }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(url: &str, gpu: &str, ts: u64, power: Option<f64>) -> TelemetryRecord {
        TelemetryRecord {
            timestamp_ns: ts,
            dcgm_url: url.to_string(),
            gpu_index: 0,
            gpu_uuid: gpu.to_string(),
            model_name: Some("H100".to_string()),
            pci_bus_id: None,
            device: None,
            hostname: None,
            power_usage: power,
            power_limit: None,
            energy_consumption: None,
            utilization: None,
            memory_used_gb: None,
            memory_total_gb: None,
            temperature: None,
        }
    }

    #[test]
    fn endpoint_with_no_samples_is_unreachable() {
        let store = TelemetryStore::new(vec!["http://a".to_string(), "http://b".to_string()]);
        let mut store = store;
        store.record(sample("http://a", "gpu-0", 1, Some(100.0)));
        let hierarchy = store.summarize();
        assert!(hierarchy.endpoints["http://a"].reachable);
        assert!(!hierarchy.endpoints["http://b"].reachable);
    }

    #[test]
    fn gpu_metadata_is_frozen_at_first_sighting() {
        let mut store = TelemetryStore::new(vec!["http://a".to_string()]);
        store.record(sample("http://a", "gpu-0", 1, Some(100.0)));
        store.record(TelemetryRecord {
            model_name: Some("different-name".to_string()),
            ..sample("http://a", "gpu-0", 2, Some(110.0))
        });
        let hierarchy = store.summarize();
        let gpu = &hierarchy.endpoints["http://a"].gpus["gpu-0"];
        assert_eq!(gpu.gpu_name.as_deref(), Some("H100"));
        assert_eq!(gpu.metrics["gpu_power_usage"].count, 2);
    }
}
