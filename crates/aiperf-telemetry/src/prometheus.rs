//! Prometheus text-format parsing for DCGM exporter responses (spec §4.9,
//! §6 "Telemetry input"). Only the metric names in [`DCGM_METRICS`] are
//! consumed; everything else is silently ignored, matching "Unknown metrics
//! are silently ignored."
//!
//! Replaces the original's enum-string parsing with a fixed table built
//! once (Design Notes: "Enum string parsing for telemetry metric names").

use std::collections::HashMap;

/// `(dcgm_name, internal_name, scale)`. Scale is applied to the raw sample
/// value: MiB->GB is `0.001048576`, mJ->MJ is `1e-9`, everything else
/// passes through unscaled (spec §4.9).
pub const DCGM_METRICS: &[(&str, &str, f64)] = &[
    ("DCGM_FI_DEV_POWER_USAGE", "power_usage", 1.0),
    ("DCGM_FI_DEV_POWER_MGMT_LIMIT", "power_limit", 1.0),
    ("DCGM_FI_DEV_TOTAL_ENERGY_CONSUMPTION", "energy_consumption", 1e-9),
    ("DCGM_FI_DEV_GPU_UTIL", "utilization", 1.0),
    ("DCGM_FI_DEV_FB_USED", "memory_used_gb", 0.001048576),
    ("DCGM_FI_DEV_FB_TOTAL", "memory_total_gb", 0.001048576),
    ("DCGM_FI_DEV_GPU_TEMP", "temperature", 1.0),
    ("DCGM_FI_DEV_SM_CLOCK", "sm_clock", 1.0),
    ("DCGM_FI_DEV_MEM_CLOCK", "mem_clock", 1.0),
    ("DCGM_FI_DEV_MEMORY_TEMP", "memory_temp", 1.0),
];

fn lookup(dcgm_name: &str) -> Option<(&'static str, f64)> {
    DCGM_METRICS
        .iter()
        .find(|(name, _, _)| *name == dcgm_name)
        .map(|(_, internal, scale)| (*internal, *scale))
}

/// One decoded sample line: which GPU it belongs to, which internal metric
/// name, the scaled value, and whatever identifying labels were present.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub gpu_uuid: String,
    pub gpu_index: u32,
    pub model_name: Option<String>,
    pub pci_bus_id: Option<String>,
    pub device: Option<String>,
    pub hostname: Option<String>,
    pub metric: &'static str,
    pub value: f64,
}

/// Parses a full Prometheus text-format response body into samples for the
/// metrics AIPerf cares about. Malformed lines are skipped, not fatal (spec
/// §4.9: "Empty or malformed responses are logged and produce zero
/// records").
pub fn parse(body: &str) -> Vec<Sample> {
    body.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<Sample> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let brace_open = line.find('{')?;
    let metric_name = &line[..brace_open];
    let (internal_metric, scale) = lookup(metric_name)?;

    let brace_close = line.find('}')?;
    let labels = parse_labels(&line[brace_open + 1..brace_close]);

    let rest = line[brace_close + 1..].trim();
    let value_str = rest.split_whitespace().next()?;
    let raw_value: f64 = value_str.parse().ok()?;

    let gpu_uuid = labels.get("UUID").or_else(|| labels.get("uuid")).cloned()?;
    let gpu_index = labels
        .get("gpu")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    Some(Sample {
        gpu_uuid,
        gpu_index,
        model_name: labels.get("modelName").cloned(),
        pci_bus_id: labels.get("pci_bus_id").cloned(),
        device: labels.get("device").cloned(),
        hostname: labels.get("Hostname").or_else(|| labels.get("hostname")).cloned(),
        metric: internal_metric,
        value: raw_value * scale,
    })
}

/// Parses a Prometheus label set (`k1="v1",k2="v2"`) into a map, tolerating
/// escaped quotes inside values.
fn parse_labels(raw: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    let mut chars = raw.chars().peekable();
    while chars.peek().is_some() {
        let key: String = chars.by_ref().take_while(|&c| c != '=').collect();
        let key = key.trim().to_string();
        if key.is_empty() {
            break;
        }
        if chars.peek() != Some(&'"') {
            continue;
        }
        chars.next();
        let mut value = String::new();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if let Some(next) = chars.next() {
                        value.push(next);
                    }
                }
                '"' => break,
                other => value.push(other),
            }
        }
        labels.insert(key, value);
        if chars.peek() == Some(&',') {
            chars.next();
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_sample_line() {
        let body = r#"DCGM_FI_DEV_POWER_USAGE{gpu="0",UUID="GPU-abc",device="nvidia0",modelName="H100",Hostname="node-1"} 312.5"#;
        let samples = parse(body);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].gpu_uuid, "GPU-abc");
        assert_eq!(samples[0].gpu_index, 0);
        assert_eq!(samples[0].metric, "power_usage");
        assert_eq!(samples[0].value, 312.5);
    }

    #[test]
    fn scales_memory_from_mib_to_gb() {
        let body = r#"DCGM_FI_DEV_FB_USED{gpu="1",UUID="GPU-xyz"} 10240"#;
        let samples = parse(body);
        assert_eq!(samples.len(), 1);
        assert!((samples[0].value - 10240.0 * 0.001048576).abs() < 1e-6);
    }

    #[test]
    fn ignores_unknown_metric_names() {
        let body = r#"DCGM_FI_DEV_UNKNOWN_THING{gpu="0",UUID="GPU-abc"} 1.0"#;
        assert!(parse(body).is_empty());
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let body = "# HELP foo\n\n# TYPE foo gauge\n";
        assert!(parse(body).is_empty());
    }

    #[test]
    fn malformed_response_yields_zero_records() {
        assert!(parse("not prometheus at all").is_empty());
    }

    #[test]
    fn skips_samples_missing_a_uuid_label() {
        let body = r#"DCGM_FI_DEV_GPU_UTIL{gpu="0"} 42"#;
        assert!(parse(body).is_empty());
    }
}
