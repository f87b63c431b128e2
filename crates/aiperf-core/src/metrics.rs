//! Percentile/summary statistics shared by the results aggregator and the
//! telemetry processor (spec §4.8, §4.9).

use crate::model::MetricResult;

/// Header/unit lookup for known metric tags, used when building
/// `MetricResult`s for export. Unknown tags fall back to the tag itself as
/// the header and an empty unit.
const METRIC_META: &[(&str, &str, &str)] = &[
    ("request_latency", "Request Latency", "ms"),
    ("ttft", "Time To First Token", "ms"),
    ("inter_token_latency", "Inter Token Latency", "ms"),
    ("output_token_throughput", "Output Token Throughput", "tokens/sec"),
    ("output_sequence_length", "Output Sequence Length", "tokens"),
    ("input_sequence_length", "Input Sequence Length", "tokens"),
    ("request_count", "Request Count", ""),
    ("request_count_error", "Request Count (Errors)", ""),
    ("gpu_power_usage", "GPU Power Usage", "W"),
    ("gpu_power_limit", "GPU Power Limit", "W"),
    ("gpu_energy_consumption", "GPU Energy Consumption", "MJ"),
    ("gpu_utilization", "GPU Utilization", "%"),
    ("gpu_memory_used", "GPU Memory Used", "GB"),
    ("gpu_memory_total", "GPU Memory Total", "GB"),
    ("gpu_temperature", "GPU Temperature", "C"),
];

/// Resolves an arbitrary tag string (e.g. one decoded from JSON, which has
/// lost the `'static` lifetime metric tags carry at the source) back to the
/// `'static` literal from [`METRIC_META`], so callers can rebuild a
/// `MetricRecordDict` without leaking memory per record.
pub fn known_tag(tag: &str) -> Option<&'static str> {
    METRIC_META.iter().find(|(t, _, _)| *t == tag).map(|(t, _, _)| *t)
}

pub fn metric_header(tag: &str) -> &'static str {
    METRIC_META
        .iter()
        .find(|(t, _, _)| *t == tag)
        .map(|(_, h, _)| *h)
        .unwrap_or("")
}

pub fn metric_unit(tag: &str) -> &'static str {
    METRIC_META
        .iter()
        .find(|(t, _, _)| *t == tag)
        .map(|(_, _, u)| *u)
        .unwrap_or("")
}

/// Linear-interpolation percentile over a sorted slice, matching numpy's
/// default `interpolation="linear"` behavior used by the original
/// implementation.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Summarizes a growable numeric array into a `MetricResult` (spec §4.8).
/// `count > 0` is required by callers before invoking this; an empty slice
/// returns a zeroed result rather than panicking, so the aggregator can
/// still report "unreachable" telemetry endpoints uniformly.
pub fn summarize(tag: &str, values: &[f64]) -> MetricResult {
    let count = values.len();
    if count == 0 {
        return MetricResult {
            tag: tag.to_string(),
            header: metric_header(tag).to_string(),
            unit: metric_unit(tag).to_string(),
            count: 0,
            min: 0.0,
            max: 0.0,
            avg: 0.0,
            std: 0.0,
            p1: 0.0,
            p5: 0.0,
            p25: 0.0,
            p50: 0.0,
            p75: 0.0,
            p90: 0.0,
            p95: 0.0,
            p99: 0.0,
        };
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let sum: f64 = sorted.iter().sum();
    let avg = sum / count as f64;
    let variance = sorted.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / count as f64;
    let std = variance.sqrt();

    MetricResult {
        tag: tag.to_string(),
        header: metric_header(tag).to_string(),
        unit: metric_unit(tag).to_string(),
        count,
        min: sorted[0],
        max: sorted[count - 1],
        avg,
        std,
        p1: percentile(&sorted, 1.0),
        p5: percentile(&sorted, 5.0),
        p25: percentile(&sorted, 25.0),
        p50: percentile(&sorted, 50.0),
        p75: percentile(&sorted, 75.0),
        p90: percentile(&sorted, 90.0),
        p95: percentile(&sorted, 95.0),
        p99: percentile(&sorted, 99.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_median_of_odd_set() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 50.0), 3.0);
    }

    #[test]
    fn percentile_interpolates_between_points() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0];
        // rank = 0.99 * 3 = 2.97 -> between index 2 (3.0) and 3 (4.0)
        let p99 = percentile(&sorted, 99.0);
        assert!((p99 - 3.97).abs() < 1e-9);
    }

    #[test]
    fn summarize_empty_is_zeroed_not_panicking() {
        let result = summarize("ttft", &[]);
        assert_eq!(result.count, 0);
        assert_eq!(result.min, 0.0);
    }

    #[test]
    fn summarize_computes_basic_stats() {
        let values = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        let result = summarize("request_latency", &values);
        assert_eq!(result.count, 5);
        assert_eq!(result.min, 10.0);
        assert_eq!(result.max, 50.0);
        assert_eq!(result.avg, 30.0);
        assert_eq!(result.p50, 30.0);
        assert_eq!(result.unit, "ms");
    }
}
