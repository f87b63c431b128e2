//! Per-tag growable metric arrays (spec §4.8): appended in arrival order,
//! summarized on demand. Warmup records are excluded entirely, matching the
//! resolved Open Question that `request_count` (and every other metric)
//! counts only non-warmup records.

use std::collections::HashMap;

use aiperf_core::metrics;
use aiperf_core::model::{MetricRecordDict, MetricResult};

#[derive(Default)]
pub struct MetricStore {
    values: HashMap<&'static str, Vec<f64>>,
    error_messages: Vec<String>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, metrics: &MetricRecordDict, is_warmup: bool, error: Option<&str>) {
        if is_warmup {
            return;
        }
        for (tag, value) in metrics {
            self.values.entry(tag).or_default().push(*value);
        }
        if let Some(error) = error {
            self.error_messages.push(error.to_string());
        }
    }

    /// Total non-warmup records observed, derived from `request_latency`'s
    /// array length since every non-warmup record contributes one (spec §8:
    /// `request_latency` is computed unconditionally).
    pub fn request_count(&self) -> usize {
        self.values.get("request_latency").map(Vec::len).unwrap_or(0)
    }

    pub fn errors(&self) -> &[String] {
        &self.error_messages
    }

    /// Summarizes every recorded tag plus a synthetic `request_count` tag
    /// (spec §8: "`request_count` in final results equals the number of
    /// non-warmup records emitted"), reported as a degenerate single-value
    /// distribution so `avg`/`min`/`max` all equal the count.
    pub fn summarize(&self) -> Vec<MetricResult> {
        let mut results: Vec<MetricResult> = self
            .values
            .iter()
            .map(|(tag, values)| metrics::summarize(tag, values))
            .collect();
        results.push(metrics::summarize("request_count", &[self.request_count() as f64]));
        results.sort_by(|a, b| a.tag.cmp(&b.tag));
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(pairs: &[(&'static str, f64)]) -> MetricRecordDict {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn warmup_records_are_excluded() {
        let mut store = MetricStore::new();
        store.record(&dict(&[("request_latency", 5.0)]), true, None);
        assert_eq!(store.request_count(), 0);
    }

    #[test]
    fn non_warmup_records_accumulate() {
        let mut store = MetricStore::new();
        store.record(&dict(&[("request_latency", 5.0)]), false, None);
        store.record(&dict(&[("request_latency", 10.0)]), false, None);
        assert_eq!(store.request_count(), 2);
        let summary = store.summarize();
        assert_eq!(summary.len(), 2);
        let latency = summary.iter().find(|r| r.tag == "request_latency").unwrap();
        assert_eq!(latency.count, 2);
        let request_count = summary.iter().find(|r| r.tag == "request_count").unwrap();
        assert_eq!(request_count.avg, 2.0);
    }

    #[test]
    fn summarize_always_reports_request_count() {
        let store = MetricStore::new();
        let summary = store.summarize();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].tag, "request_count");
        assert_eq!(summary[0].avg, 0.0);
    }

    #[test]
    fn errors_are_collected_for_non_warmup_records() {
        let mut store = MetricStore::new();
        store.record(&dict(&[("request_count_error", 1.0)]), false, Some("timeout"));
        assert_eq!(store.errors(), &["timeout".to_string()]);
    }
}
