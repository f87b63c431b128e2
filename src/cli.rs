//! Command-line surface (spec §6): the `profile` entry point's flag groups,
//! plus the hidden `--service-type`/`--service-id`/`--config-file` triple
//! used only by the re-exec bootstrap (`bootstrap::spawn_self`) to start a
//! single service process. Grounded on the teacher's `server/config.rs`
//! `CliArgs` -> `TryFrom<CliArgs> for ServerConfig` shape.

use std::path::PathBuf;

use clap::Parser;

use aiperf_core::config::{
    AudioFormat, AudioGenConfig, CommBackend, CustomDatasetType, EndpointConfig, EndpointType, ImageFormat,
    ImageGenConfig, InputConfig, LoadConfig, OutputConfig, OutputTokensConfig, PrefixPromptConfig, RequestRateMode,
    ServiceConfig, SyntheticTokensConfig, TelemetryConfig, UiMode, UserConfig,
};
use aiperf_core::error::{AiPerfError, Result};

#[derive(Parser, Debug, Clone)]
#[command(name = "aiperf", version, about = "Distributed load generator and measurement tool for AI inference endpoints")]
pub struct CliArgs {
    /// Model name(s) to request. Repeat the flag to benchmark several
    /// models round-robin.
    #[arg(long = "model", required_unless_present = "service_type")]
    pub models: Vec<String>,

    /// Base URL of the inference server.
    #[arg(long, env = "AIPERF_URL", default_value = "localhost:8080")]
    pub url: String,

    /// One of chat, completions, embeddings, rankings.
    #[arg(long, default_value = "chat")]
    pub endpoint_type: String,

    /// Use server-sent-event streaming responses.
    #[arg(long, default_value_t = true)]
    pub streaming: bool,

    #[arg(long, env = "AIPERF_API_KEY")]
    pub api_key: Option<String>,

    #[arg(long, default_value_t = 600.0)]
    pub timeout: f64,

    // --- Load ---
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    #[arg(long)]
    pub request_rate: Option<f64>,

    /// poisson or constant.
    #[arg(long, default_value = "poisson")]
    pub request_rate_mode: String,

    #[arg(long, default_value_t = 10)]
    pub request_count: usize,

    #[arg(long, default_value_t = 0)]
    pub warmup_request_count: usize,

    #[arg(long)]
    pub benchmark_duration: Option<f64>,

    #[arg(long)]
    pub concurrency_ramp_up_time: Option<f64>,

    #[arg(long, default_value_t = 0.0)]
    pub request_cancellation_rate: f64,

    #[arg(long, default_value_t = 0.0)]
    pub request_cancellation_delay: f64,

    // --- Input ---
    #[arg(long, default_value_t = 1)]
    pub batch_size: usize,

    #[arg(long)]
    pub input_file: Option<PathBuf>,

    /// single_turn, multi_turn, or mooncake_trace.
    #[arg(long, default_value = "mooncake_trace")]
    pub custom_dataset_type: String,

    #[arg(long)]
    pub random_seed: Option<u64>,

    #[arg(long, default_value_t = 100)]
    pub num_conversations: usize,

    #[arg(long, default_value_t = 550.0)]
    pub synthetic_input_tokens_mean: f64,

    #[arg(long, default_value_t = 0.0)]
    pub synthetic_input_tokens_stddev: f64,

    #[arg(long, default_value_t = 512)]
    pub synthetic_input_tokens_block_size: u32,

    #[arg(long)]
    pub output_tokens_mean: Option<f64>,

    #[arg(long, default_value_t = 0.0)]
    pub output_tokens_stddev: f64,

    #[arg(long, default_value_t = 0)]
    pub prefix_prompt_pool_size: usize,

    #[arg(long, default_value_t = 0)]
    pub prefix_prompt_length: usize,

    #[arg(long, default_value_t = 0.0)]
    pub image_width_mean: f64,
    #[arg(long, default_value_t = 0.0)]
    pub image_width_stddev: f64,
    #[arg(long, default_value_t = 0.0)]
    pub image_height_mean: f64,
    #[arg(long, default_value_t = 0.0)]
    pub image_height_stddev: f64,
    /// png, jpeg, or random.
    #[arg(long, default_value = "png")]
    pub image_format: String,

    #[arg(long, default_value_t = 0.0)]
    pub audio_length_mean: f64,
    #[arg(long, default_value_t = 0.0)]
    pub audio_length_stddev: f64,
    /// wav or mp3.
    #[arg(long, default_value = "wav")]
    pub audio_format: String,

    // --- Telemetry ---
    /// DCGM exporter URL(s) to poll for GPU telemetry. Repeatable.
    #[arg(long = "dcgm-url")]
    pub dcgm_urls: Vec<String>,

    #[arg(long, default_value_t = 1.0)]
    pub telemetry_interval: f64,

    // --- Output ---
    #[arg(long, default_value = "./artifacts")]
    pub artifact_dir: PathBuf,

    #[arg(long, default_value = "profile_export.json")]
    pub profile_export_file: PathBuf,

    // --- Service ---
    /// ipc or tcp.
    #[arg(long, env = "AIPERF_COMM_BACKEND", default_value = "ipc")]
    pub comm_backend: String,

    #[arg(long, env = "AIPERF_BUS_ADDR")]
    pub bus_addr: Option<String>,

    #[arg(long, env = "AIPERF_MAX_WORKERS", default_value_t = 32)]
    pub max_workers: usize,

    #[arg(long, env = "AIPERF_MIN_WORKERS", default_value_t = 1)]
    pub min_workers: usize,

    #[arg(long, env = "AIPERF_RESULT_PARSER_SERVICE_COUNT", default_value_t = 2)]
    pub record_processors: usize,

    #[arg(long, env = "AIPERF_HEARTBEAT_INTERVAL", default_value_t = 5.0)]
    pub heartbeat_interval: f64,

    #[arg(long, env = "AIPERF_HEARTBEAT_TIMEOUT", default_value_t = 60.0)]
    pub heartbeat_timeout: f64,

    #[arg(long, env = "AIPERF_REGISTRATION_TIMEOUT", default_value_t = 60.0)]
    pub registration_timeout: f64,

    #[arg(long, env = "AIPERF_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit JSON-formatted log lines instead of human-readable ones.
    #[arg(long, default_value_t = false)]
    pub log_json: bool,

    /// dashboard, simple, or none.
    #[arg(long, default_value = "simple")]
    pub ui: String,

    /// Internal: selects which service to run as the re-exec'd child
    /// process. Not set on the top-level `aiperf` invocation.
    #[arg(long, hide = true)]
    pub service_type: Option<String>,

    #[arg(long, hide = true)]
    pub service_id: Option<String>,

    /// Internal: path to the JSON-serialized `ServiceConfig` the child
    /// reads on startup (a file rather than argv, to avoid OS argv length
    /// limits on a fully populated `UserConfig`).
    #[arg(long, hide = true)]
    pub config_file: Option<PathBuf>,
}

impl CliArgs {
    pub fn is_child_service(&self) -> bool {
        self.service_type.is_some()
    }
}

impl TryFrom<&CliArgs> for UserConfig {
    type Error = AiPerfError;

    fn try_from(args: &CliArgs) -> Result<Self> {
        let config = UserConfig {
            model_names: args.models.clone(),
            endpoint: EndpointConfig {
                models: args.models.clone(),
                url: args.url.clone(),
                endpoint_type: parse_endpoint_type(&args.endpoint_type)?,
                streaming: args.streaming,
                api_key: args.api_key.clone(),
                timeout_secs: args.timeout,
            },
            input: InputConfig {
                batch_size: args.batch_size,
                file: args.input_file.clone(),
                custom_dataset_type: parse_custom_dataset_type(&args.custom_dataset_type)?,
                random_seed: args.random_seed,
                num_conversations: args.num_conversations,
                synthetic_tokens: SyntheticTokensConfig {
                    mean: args.synthetic_input_tokens_mean,
                    stddev: args.synthetic_input_tokens_stddev,
                    block_size: Some(args.synthetic_input_tokens_block_size),
                },
                output_tokens: OutputTokensConfig { mean: args.output_tokens_mean, stddev: args.output_tokens_stddev },
                prefix_prompt: PrefixPromptConfig { pool_size: args.prefix_prompt_pool_size, length: args.prefix_prompt_length },
                image: ImageGenConfig {
                    width_mean: args.image_width_mean,
                    width_stddev: args.image_width_stddev,
                    height_mean: args.image_height_mean,
                    height_stddev: args.image_height_stddev,
                    format: parse_image_format(&args.image_format)?,
                },
                audio: AudioGenConfig {
                    length_mean: args.audio_length_mean,
                    length_stddev: args.audio_length_stddev,
                    format: parse_audio_format(&args.audio_format)?,
                },
                extra: Default::default(),
            },
            load: LoadConfig {
                concurrency: args.concurrency,
                request_rate: args.request_rate,
                request_rate_mode: parse_request_rate_mode(&args.request_rate_mode)?,
                request_count: args.request_count,
                warmup_request_count: args.warmup_request_count,
                benchmark_duration_secs: args.benchmark_duration,
                concurrency_ramp_up_secs: args.concurrency_ramp_up_time,
                request_cancellation_rate: args.request_cancellation_rate,
                request_cancellation_delay_secs: args.request_cancellation_delay,
            },
            output: OutputConfig {
                artifact_dir: args.artifact_dir.clone(),
                profile_export_file: args.profile_export_file.clone(),
            },
            telemetry: TelemetryConfig { dcgm_urls: args.dcgm_urls.clone(), collection_interval_secs: args.telemetry_interval },
        };
        config.validate()
    }
}

impl TryFrom<&CliArgs> for ServiceConfig {
    type Error = AiPerfError;

    fn try_from(args: &CliArgs) -> Result<Self> {
        Ok(ServiceConfig {
            comm_backend: parse_comm_backend(&args.comm_backend)?,
            bus_addr: args.bus_addr.clone().unwrap_or_else(aiperf_core::config::default_ipc_path),
            heartbeat_interval_secs: args.heartbeat_interval,
            heartbeat_timeout_secs: args.heartbeat_timeout,
            registration_timeout_secs: args.registration_timeout,
            command_timeout_secs: 10.0,
            progress_interval_secs: 1.0,
            max_workers: args.max_workers,
            min_workers: args.min_workers,
            result_parser_service_count: args.record_processors,
            log_level: args.log_level.clone(),
            artifact_dir: args.artifact_dir.clone(),
            ui: parse_ui_mode(&args.ui)?,
        })
    }
}

fn parse_endpoint_type(raw: &str) -> Result<EndpointType> {
    match raw {
        "chat" => Ok(EndpointType::Chat),
        "completions" => Ok(EndpointType::Completions),
        "embeddings" => Ok(EndpointType::Embeddings),
        "rankings" => Ok(EndpointType::Rankings),
        other => Err(AiPerfError::configuration(format!("unknown --endpoint-type {other}"))),
    }
}

fn parse_request_rate_mode(raw: &str) -> Result<RequestRateMode> {
    match raw {
        "poisson" => Ok(RequestRateMode::Poisson),
        "constant" => Ok(RequestRateMode::Constant),
        other => Err(AiPerfError::configuration(format!("unknown --request-rate-mode {other}"))),
    }
}

fn parse_custom_dataset_type(raw: &str) -> Result<CustomDatasetType> {
    match raw {
        "single_turn" => Ok(CustomDatasetType::SingleTurn),
        "multi_turn" => Ok(CustomDatasetType::MultiTurn),
        "mooncake_trace" => Ok(CustomDatasetType::MooncakeTrace),
        other => Err(AiPerfError::configuration(format!("unknown --custom-dataset-type {other}"))),
    }
}

fn parse_image_format(raw: &str) -> Result<ImageFormat> {
    match raw {
        "png" => Ok(ImageFormat::Png),
        "jpeg" => Ok(ImageFormat::Jpeg),
        "random" => Ok(ImageFormat::Random),
        other => Err(AiPerfError::configuration(format!("unknown --image-format {other}"))),
    }
}

fn parse_audio_format(raw: &str) -> Result<AudioFormat> {
    match raw {
        "wav" => Ok(AudioFormat::Wav),
        "mp3" => Ok(AudioFormat::Mp3),
        other => Err(AiPerfError::configuration(format!("unknown --audio-format {other}"))),
    }
}

fn parse_comm_backend(raw: &str) -> Result<CommBackend> {
    match raw {
        "ipc" => Ok(CommBackend::Ipc),
        "tcp" => Ok(CommBackend::Tcp),
        other => Err(AiPerfError::configuration(format!("unknown --comm-backend {other}"))),
    }
}

fn parse_ui_mode(raw: &str) -> Result<UiMode> {
    match raw {
        "dashboard" => Ok(UiMode::Dashboard),
        "simple" => Ok(UiMode::Simple),
        "none" => Ok(UiMode::None),
        other => Err(AiPerfError::configuration(format!("unknown --ui {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_profile_invocation() {
        let args = CliArgs::parse_from(["aiperf", "--model", "gpt-test", "--url", "http://localhost:9000"]);
        let user_config = UserConfig::try_from(&args).expect("valid config");
        assert_eq!(user_config.model_names, vec!["gpt-test".to_string()]);
        assert_eq!(user_config.endpoint.url, "http://localhost:9000");
    }

    #[test]
    fn rejects_unknown_endpoint_type() {
        let mut args = CliArgs::parse_from(["aiperf", "--model", "m"]);
        args.endpoint_type = "graphql".to_string();
        assert!(UserConfig::try_from(&args).is_err());
    }

    #[test]
    fn service_config_defaults_bus_addr_when_unset() {
        let args = CliArgs::parse_from(["aiperf", "--model", "m"]);
        let service_config = ServiceConfig::try_from(&args).expect("valid service config");
        assert!(!service_config.bus_addr.is_empty());
    }
}
