//! Validated configuration records (spec §6). The CLI/YAML loader that
//! builds a `UserConfig` is out of scope (spec.md §1 non-goals); this module
//! owns the record shape every service is handed, plus the pure
//! `validate()` function the Design Notes call for in place of the
//! original's nested-annotated-record validation.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{AiPerfError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointType {
    Chat,
    Completions,
    Embeddings,
    Rankings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestRateMode {
    Poisson,
    Constant,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingMode {
    Concurrency,
    RequestRate,
    FixedSchedule,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomDatasetType {
    SingleTurn,
    MultiTurn,
    MooncakeTrace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommBackend {
    Ipc,
    Tcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiMode {
    Dashboard,
    Simple,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub models: Vec<String>,
    pub url: String,
    pub endpoint_type: EndpointType,
    pub streaming: bool,
    pub api_key: Option<String>,
    pub timeout_secs: f64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            url: "localhost:8080".to_string(),
            endpoint_type: EndpointType::Chat,
            streaming: true,
            api_key: None,
            timeout_secs: 600.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub concurrency: usize,
    pub request_rate: Option<f64>,
    pub request_rate_mode: RequestRateMode,
    pub request_count: usize,
    pub warmup_request_count: usize,
    pub benchmark_duration_secs: Option<f64>,
    pub concurrency_ramp_up_secs: Option<f64>,
    pub request_cancellation_rate: f64,
    pub request_cancellation_delay_secs: f64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            request_rate: None,
            request_rate_mode: RequestRateMode::Poisson,
            request_count: 10,
            warmup_request_count: 0,
            benchmark_duration_secs: None,
            concurrency_ramp_up_secs: None,
            request_cancellation_rate: 0.0,
            request_cancellation_delay_secs: 0.0,
        }
    }
}

impl LoadConfig {
    /// Resolves the timing mode the same way `TimingManagerConfig::from_user_config`
    /// does in the original: an input file implies fixed-schedule, else an
    /// explicit request rate implies rate mode, else concurrency.
    pub fn timing_mode(&self, has_input_file: bool) -> TimingMode {
        if has_input_file {
            TimingMode::FixedSchedule
        } else if self.request_rate.is_some() {
            TimingMode::RequestRate
        } else {
            TimingMode::Concurrency
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticTokensConfig {
    pub mean: f64,
    pub stddev: f64,
    pub block_size: Option<u32>,
}

impl Default for SyntheticTokensConfig {
    fn default() -> Self {
        Self {
            mean: 550.0,
            stddev: 0.0,
            block_size: Some(512),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputTokensConfig {
    pub mean: Option<f64>,
    pub stddev: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PrefixPromptConfig {
    pub pool_size: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenConfig {
    pub width_mean: f64,
    pub width_stddev: f64,
    pub height_mean: f64,
    pub height_stddev: f64,
    pub format: ImageFormat,
}

impl Default for ImageGenConfig {
    fn default() -> Self {
        Self {
            width_mean: 0.0,
            width_stddev: 0.0,
            height_mean: 0.0,
            height_stddev: 0.0,
            format: ImageFormat::Png,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioGenConfig {
    pub length_mean: f64,
    pub length_stddev: f64,
    pub format: AudioFormat,
}

impl Default for AudioGenConfig {
    fn default() -> Self {
        Self {
            length_mean: 0.0,
            length_stddev: 0.0,
            format: AudioFormat::Wav,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub batch_size: usize,
    pub file: Option<PathBuf>,
    pub custom_dataset_type: CustomDatasetType,
    pub random_seed: Option<u64>,
    pub num_conversations: usize,
    pub synthetic_tokens: SyntheticTokensConfig,
    pub output_tokens: OutputTokensConfig,
    pub prefix_prompt: PrefixPromptConfig,
    pub image: ImageGenConfig,
    pub audio: AudioGenConfig,
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            file: None,
            custom_dataset_type: CustomDatasetType::MooncakeTrace,
            random_seed: None,
            num_conversations: 100,
            synthetic_tokens: SyntheticTokensConfig::default(),
            output_tokens: OutputTokensConfig::default(),
            prefix_prompt: PrefixPromptConfig::default(),
            image: ImageGenConfig::default(),
            audio: AudioGenConfig::default(),
            extra: HashMap::new(),
        }
    }
}

impl InputConfig {
    pub fn is_fixed_schedule(&self) -> bool {
        self.file.is_some() && self.custom_dataset_type != CustomDatasetType::MooncakeTrace
    }
}

// CustomDatasetType needs PartialEq for the comparison above.
impl PartialEq for CustomDatasetType {
    fn eq(&self, other: &Self) -> bool {
        core::mem::discriminant(self) == core::mem::discriminant(other)
    }
}

/// GPU telemetry collection (spec §4.9). Not part of spec.md's CLI subset
/// (§6 only specifies the DCGM wire format), added here because the
/// telemetry manager needs a way to learn which endpoints to poll.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetryConfig {
    pub dcgm_urls: Vec<String>,
    pub collection_interval_secs: f64,
}

impl TelemetryConfig {
    pub fn is_enabled(&self) -> bool {
        !self.dcgm_urls.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub artifact_dir: PathBuf,
    pub profile_export_file: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("./artifacts"),
            profile_export_file: PathBuf::from("profile_export.json"),
        }
    }
}

/// The top-level validated record handed to the controller and, by value,
/// to every spawned service (spec §6, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub model_names: Vec<String>,
    pub endpoint: EndpointConfig,
    pub input: InputConfig,
    pub load: LoadConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl UserConfig {
    /// Pure validation function (Design Notes: replaces nested-annotated-record
    /// validation with a flat `validate(raw) -> Result<Config, ConfigurationError>`).
    pub fn validate(self) -> Result<Self> {
        if self.model_names.is_empty() {
            return Err(AiPerfError::configuration(
                "at least one --model name is required",
            ));
        }
        if self.endpoint.url.is_empty() {
            return Err(AiPerfError::configuration("--url must not be empty"));
        }
        if self.load.concurrency == 0 && self.load.request_rate.is_none() && self.input.file.is_none()
        {
            return Err(AiPerfError::configuration(
                "one of --concurrency, --request-rate, or --input-file is required",
            ));
        }
        if let Some(rate) = self.load.request_rate {
            if rate <= 0.0 {
                return Err(AiPerfError::configuration(
                    "--request-rate must be positive",
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.load.request_cancellation_rate) {
            return Err(AiPerfError::configuration(
                "--request-cancellation-rate must be within [0, 1]",
            ));
        }
        Ok(self)
    }
}

/// Per-process configuration handed to every spawned service
/// (`common/config/service_config.py`). Overridable via `AIPERF_*` env vars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub comm_backend: CommBackend,
    pub bus_addr: String,
    pub heartbeat_interval_secs: f64,
    pub heartbeat_timeout_secs: f64,
    pub registration_timeout_secs: f64,
    pub command_timeout_secs: f64,
    pub progress_interval_secs: f64,
    pub max_workers: usize,
    pub min_workers: usize,
    pub result_parser_service_count: usize,
    pub log_level: String,
    pub artifact_dir: PathBuf,
    pub ui: UiMode,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            comm_backend: CommBackend::Ipc,
            bus_addr: default_ipc_path(),
            heartbeat_interval_secs: 5.0,
            heartbeat_timeout_secs: 60.0,
            registration_timeout_secs: 60.0,
            command_timeout_secs: 10.0,
            progress_interval_secs: 1.0,
            max_workers: 32,
            min_workers: 1,
            result_parser_service_count: 2,
            log_level: "info".to_string(),
            artifact_dir: PathBuf::from("./artifacts"),
            ui: UiMode::Simple,
        }
    }
}

pub fn default_ipc_path() -> String {
    format!("/tmp/aiperf-{}.sock", std::process::id())
}

/// `min(max_workers, max(min_workers, concurrency+1, cpu_count-1))`, clamped
/// to `>= 1` (Open Question resolution, SPEC_FULL.md §9).
pub fn compute_worker_count(
    max_workers: usize,
    min_workers: usize,
    concurrency: usize,
    cpu_count: usize,
) -> usize {
    let floor = min_workers
        .max(concurrency.saturating_add(1))
        .max(cpu_count.saturating_sub(1));
    max_workers.min(floor).max(1)
}

/// Applies `AIPERF_*`/`AIPERF_NODE_*`/`AIPERF_SYSTEM_*` environment overrides
/// onto a JSON value before it is deserialized into `ServiceConfig`. Mirrors
/// `pydantic_settings`' env-prefix matching: `AIPERF_LOG_LEVEL` overrides
/// `log_level`, lowercased suffix-to-field matching.
pub fn apply_env_overrides(mut value: serde_json::Value, prefix: &str) -> serde_json::Value {
    if let serde_json::Value::Object(map) = &mut value {
        for (key, val) in std::env::vars() {
            if let Some(suffix) = key.strip_prefix(prefix) {
                let field = suffix.to_lowercase();
                if map.contains_key(&field) {
                    map.insert(field, serde_json::Value::String(val));
                }
            }
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_clamps_to_max() {
        assert_eq!(compute_worker_count(4, 1, 100, 64), 4);
    }

    #[test]
    fn worker_count_floors_at_one() {
        assert_eq!(compute_worker_count(0, 0, 0, 0), 1);
    }

    #[test]
    fn worker_count_uses_concurrency_plus_one() {
        assert_eq!(compute_worker_count(32, 1, 4, 2), 5);
    }

    #[test]
    fn validate_rejects_empty_model_names() {
        let cfg = UserConfig {
            model_names: vec![],
            endpoint: EndpointConfig::default(),
            input: InputConfig::default(),
            load: LoadConfig::default(),
            output: OutputConfig::default(),
            telemetry: TelemetryConfig::default(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn timing_mode_prefers_file_over_rate() {
        let load = LoadConfig::default();
        assert_eq!(load.timing_mode(true), TimingMode::FixedSchedule);
    }
}

impl PartialEq for TimingMode {
    fn eq(&self, other: &Self) -> bool {
        core::mem::discriminant(self) == core::mem::discriminant(other)
    }
}
