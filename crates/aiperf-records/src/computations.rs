//! Per-record metric computations (spec §4.7), grounded on
//! `metrics/computations/*.py`'s one-function-per-metric registry. Each
//! computation is a pure `fn(&ParsedResponseRecord) -> Option<f64>`; `None`
//! represents `NoMetricValue` (silently skipped, not an error) rather than a
//! propagated error, per spec §7's "Silently skipped for that (record,
//! metric) pair".

use aiperf_core::model::{MetricRecordDict, ParsedResponseRecord};

/// `fn(&ParsedResponseRecord) -> Option<f64>` registered under a fixed tag,
/// in place of the original's decorator-based factory scanning (Design
/// Notes: explicit registry).
type Computation = fn(&ParsedResponseRecord) -> Option<f64>;

pub const COMPUTATIONS: &[(&str, Computation)] = &[
    ("request_latency", request_latency),
    ("ttft", ttft),
    ("inter_token_latency", inter_token_latency),
    ("output_token_throughput", output_token_throughput),
    ("output_sequence_length", output_sequence_length),
    ("input_sequence_length", input_sequence_length),
    ("request_count_error", request_count_error),
];

/// Latency-tagged metrics are stored in nanoseconds internally and
/// converted to milliseconds only on export (spec §6: "latency values
/// stored in nanoseconds internally, converted to milliseconds on export
/// (÷1e6)"); the aggregator's export layer owns that single conversion, so
/// these computations must not also divide by it.
fn request_latency(record: &ParsedResponseRecord) -> Option<f64> {
    Some((record.request.end_ns - record.request.start_ns) as f64)
}

fn ttft(record: &ParsedResponseRecord) -> Option<f64> {
    let first_ns = record.first_chunk_ns()?;
    Some((first_ns - record.request.start_ns) as f64)
}

/// Mean gap between consecutive *content-bearing* response chunks, in
/// nanoseconds (spec §6 / glossary: ITL is measured between chunks that
/// deliver `delta_tokens`, not the role-only opening chunk or the empty
/// finish-reason chunk emitted alongside it). Needs at least two such
/// chunks to have a gap to measure.
fn inter_token_latency(record: &ParsedResponseRecord) -> Option<f64> {
    let content_ns: Vec<u64> =
        record.responses.iter().filter(|chunk| chunk.delta_tokens.is_some()).map(|chunk| chunk.receive_ns).collect();
    if content_ns.len() < 2 {
        return None;
    }
    let gaps: Vec<f64> = content_ns.windows(2).map(|pair| (pair[1] - pair[0]) as f64).collect();
    Some(gaps.iter().sum::<f64>() / gaps.len() as f64)
}

fn output_token_throughput(record: &ParsedResponseRecord) -> Option<f64> {
    let output_tokens = record.output_token_count?;
    if output_tokens == 0 {
        return None;
    }
    let latency_secs = (record.request.end_ns - record.request.start_ns) as f64 / 1e9;
    if latency_secs <= 0.0 {
        return None;
    }
    Some(output_tokens as f64 / latency_secs)
}

fn output_sequence_length(record: &ParsedResponseRecord) -> Option<f64> {
    record.output_token_count.map(|v| v as f64)
}

fn input_sequence_length(record: &ParsedResponseRecord) -> Option<f64> {
    record.input_token_count.map(|v| v as f64)
}

/// Contributes `1.0` only for records that failed, so the aggregator's
/// `count` for this tag is the total error count rather than the total
/// record count.
fn request_count_error(record: &ParsedResponseRecord) -> Option<f64> {
    record.error.is_some().then_some(1.0)
}

/// Runs every registered computation against `record`, collecting only the
/// tags that produced a value.
pub fn compute_all(record: &ParsedResponseRecord) -> MetricRecordDict {
    COMPUTATIONS
        .iter()
        .filter_map(|(tag, compute)| compute(record).map(|value| (*tag, value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_core::model::{RequestSummary, ResponseChunk};

    fn base_record() -> ParsedResponseRecord {
        ParsedResponseRecord {
            request: RequestSummary {
                conversation_id: "c1".to_string(),
                turn_index: 0,
                model: "m".to_string(),
                start_ns: 1_000_000_000,
                end_ns: 1_100_000_000,
                sent_payload_summary: String::new(),
            },
            responses: Vec::new(),
            input_token_count: Some(10),
            output_token_count: Some(20),
            error: None,
            is_warmup: false,
        }
    }

    #[test]
    fn request_latency_is_end_minus_start_in_ns() {
        let record = base_record();
        assert_eq!(request_latency(&record), Some(100_000_000.0));
    }

    #[test]
    fn ttft_is_none_without_any_chunks() {
        let record = base_record();
        assert_eq!(ttft(&record), None);
    }

    #[test]
    fn ttft_is_first_chunk_minus_start_in_ns() {
        let mut record = base_record();
        record.responses.push(ResponseChunk {
            receive_ns: 1_010_000_000,
            ..Default::default()
        });
        assert_eq!(ttft(&record), Some(10_000_000.0));
    }

    #[test]
    fn inter_token_latency_needs_at_least_two_chunks() {
        let mut record = base_record();
        record.responses.push(ResponseChunk {
            receive_ns: 1_010_000_000,
            delta_tokens: Some(1),
            ..Default::default()
        });
        assert_eq!(inter_token_latency(&record), None);
        record.responses.push(ResponseChunk {
            receive_ns: 1_020_000_000,
            delta_tokens: Some(1),
            ..Default::default()
        });
        assert_eq!(inter_token_latency(&record), Some(10_000_000.0));
    }

    #[test]
    fn inter_token_latency_ignores_empty_chunks() {
        let mut record = base_record();
        // role-only opening chunk: no delta_tokens
        record.responses.push(ResponseChunk { receive_ns: 1_000_000_000, ..Default::default() });
        record.responses.push(ResponseChunk {
            receive_ns: 1_010_000_000,
            delta_tokens: Some(1),
            ..Default::default()
        });
        record.responses.push(ResponseChunk {
            receive_ns: 1_020_000_000,
            delta_tokens: Some(1),
            ..Default::default()
        });
        // empty finish-reason chunk: no delta_tokens
        record.responses.push(ResponseChunk {
            receive_ns: 1_090_000_000,
            finish_reason: Some("stop".to_string()),
            ..Default::default()
        });
        assert_eq!(inter_token_latency(&record), Some(10_000_000.0));
    }

    #[test]
    fn request_count_error_skips_successful_records() {
        let record = base_record();
        assert_eq!(request_count_error(&record), None);
    }

    #[test]
    fn request_count_error_counts_failures() {
        let mut record = base_record();
        record.error = Some("timeout".to_string());
        assert_eq!(request_count_error(&record), Some(1.0));
    }

    #[test]
    fn compute_all_skips_tags_with_no_value() {
        let record = base_record();
        let dict = compute_all(&record);
        assert!(dict.contains_key("request_latency"));
        assert!(!dict.contains_key("ttft"));
        assert!(!dict.contains_key("request_count_error"));
    }
}
