//! Results JSON/CSV export formats (spec §6 "File formats: Results
//! JSON/CSV"). Pure functions: building the string is separate from writing
//! it, so the aggregator's artifact writer and any test can share the same
//! rendering logic.

use aiperf_core::config::UserConfig;
use aiperf_core::model::{FinalResults, MetricResult};

/// Renders the `Results JSON` artifact: `input_config`, `records` keyed by
/// tag, optional `telemetry_data`, `was_cancelled`, `error_summary`. Latency
/// values are already in nanoseconds internally; export converts to
/// milliseconds (spec §6: "converted to milliseconds on export (÷1e6)").
pub fn to_json(user_config: &UserConfig, results: &FinalResults) -> serde_json::Value {
    let records: serde_json::Map<String, serde_json::Value> = results
        .records
        .iter()
        .map(|record| (record.tag.clone(), serde_json::to_value(scale_for_export(record)).unwrap_or_default()))
        .collect();

    let telemetry_data = results.telemetry.as_ref().map(|hierarchy| {
        let endpoints_successful = hierarchy.endpoints.values().filter(|e| e.reachable).count();
        serde_json::json!({
            "summary": {
                "endpoints_successful": endpoints_successful,
                "endpoints_total": hierarchy.endpoints.len(),
            },
            "endpoints": hierarchy.endpoints,
        })
    });

    serde_json::json!({
        "input_config": user_config,
        "records": records,
        "telemetry_data": telemetry_data,
        "was_cancelled": results.cancelled,
        "error_summary": results.errors,
    })
}

/// Renders the `Results CSV` artifact: header row plus one row per metric,
/// latency rows in milliseconds (spec §6).
pub fn to_csv(results: &FinalResults) -> String {
    let mut out = String::from("Metric,avg,min,max,p1,p5,p25,p50,p75,p90,p95,p99,std,count\n");
    let mut records: Vec<&MetricResult> = results.records.iter().collect();
    records.sort_by(|a, b| a.tag.cmp(&b.tag));
    for record in records {
        let scaled = scale_for_export(record);
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
            scaled.tag,
            scaled.avg,
            scaled.min,
            scaled.max,
            scaled.p1,
            scaled.p5,
            scaled.p25,
            scaled.p50,
            scaled.p75,
            scaled.p90,
            scaled.p95,
            scaled.p99,
            scaled.std,
            scaled.count,
        ));
    }
    out
}

/// Latency tags are stored in nanoseconds and exported in milliseconds;
/// everything else (throughput, counts) passes through unscaled.
fn scale_for_export(record: &MetricResult) -> MetricResult {
    if record.unit != "ms" {
        return record.clone();
    }
    let scale = |v: f64| v / 1e6;
    MetricResult {
        min: scale(record.min),
        max: scale(record.max),
        avg: scale(record.avg),
        std: scale(record.std),
        p1: scale(record.p1),
        p5: scale(record.p5),
        p25: scale(record.p25),
        p50: scale(record.p50),
        p75: scale(record.p75),
        p90: scale(record.p90),
        p95: scale(record.p95),
        p99: scale(record.p99),
        ..record.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_core::config::{EndpointConfig, InputConfig, LoadConfig, OutputConfig, TelemetryConfig};

    fn config() -> UserConfig {
        UserConfig {
            model_names: vec!["m".to_string()],
            endpoint: EndpointConfig::default(),
            input: InputConfig::default(),
            load: LoadConfig::default(),
            output: OutputConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }

    fn latency_result(ns_values: &[f64]) -> MetricResult {
        aiperf_core::metrics::summarize("request_latency", ns_values)
    }

    #[test]
    fn csv_header_matches_spec_exactly() {
        let results = FinalResults {
            records: vec![],
            telemetry: None,
            cancelled: false,
            errors: vec![],
        };
        let csv = to_csv(&results);
        assert!(csv.starts_with("Metric,avg,min,max,p1,p5,p25,p50,p75,p90,p95,p99,std,count\n"));
    }

    #[test]
    fn latency_is_converted_to_milliseconds_on_export() {
        let results = FinalResults {
            records: vec![latency_result(&[1_000_000.0, 2_000_000.0])],
            telemetry: None,
            cancelled: false,
            errors: vec![],
        };
        let json = to_json(&config(), &results);
        let avg = json["records"]["request_latency"]["avg"].as_f64().unwrap();
        assert!((avg - 1.5).abs() < 1e-9);
    }

    #[test]
    fn telemetry_summary_counts_reachable_endpoints() {
        use aiperf_core::model::{TelemetryEndpointSummary, TelemetryHierarchy};
        use std::collections::HashMap;

        let mut endpoints = HashMap::new();
        endpoints.insert("a".to_string(), TelemetryEndpointSummary { reachable: true, gpus: HashMap::new() });
        endpoints.insert("b".to_string(), TelemetryEndpointSummary { reachable: false, gpus: HashMap::new() });
        let results = FinalResults {
            records: vec![],
            telemetry: Some(TelemetryHierarchy { endpoints }),
            cancelled: false,
            errors: vec![],
        };
        let json = to_json(&config(), &results);
        assert_eq!(json["telemetry_data"]["summary"]["endpoints_successful"], 1);
    }
}
