//! Core data model (spec §3): conversations/turns, credits, parsed response
//! records, metric results, telemetry records, and service registration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One ordered text/image/audio/timestamp unit of a conversation. Every
/// field is tagged by a source field name (`"text"`, `"image_url"`, ...) so
/// custom-dataset JSONL keys round-trip without loss.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Turn {
    #[serde(default)]
    pub texts: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub audios: Vec<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub delay_ms: f64,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Arbitrary pass-through fields from the source row (e.g. rankings'
    /// `{"texts": [{"name": "query", ...}]}` shape) that don't map cleanly
    /// onto `texts`/`images`/`audios`.
    #[serde(default)]
    pub optional_data: HashMap<String, serde_json::Value>,
}

impl Turn {
    /// A turn is "non-empty" if it carries at least one modality. Fixed
    /// schedule traces are permitted to violate this (spec §3 invariant
    /// carve-out) since they may supply only timing fields.
    pub fn has_modality(&self) -> bool {
        !self.texts.is_empty() || !self.images.is_empty() || !self.audios.is_empty()
    }
}

/// A session of sequential request/response interactions with a server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            turns,
        }
    }

    pub fn with_session_id(session_id: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            session_id: session_id.into(),
            turns,
        }
    }
}

/// A token of permission to send one logical request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credit {
    pub credit_id: String,
    pub conversation_id: String,
    pub drop_time_ns: u64,
    pub cancel_after_ns: Option<u64>,
    pub should_cancel: bool,
    /// Warmup credits are pre-dropped at `t0` in addition to
    /// `warmup_request_count` and are excluded from the `request_count`
    /// completion accounting (Open Question resolution, see SPEC_FULL.md §9).
    pub is_warmup: bool,
}

impl Credit {
    pub fn new(conversation_id: impl Into<String>, drop_time_ns: u64, is_warmup: bool) -> Self {
        Self {
            credit_id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            drop_time_ns,
            cancel_after_ns: None,
            should_cancel: false,
            is_warmup,
        }
    }
}

/// One chunk of a streamed response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResponseChunk {
    pub receive_ns: u64,
    pub chunk_text: String,
    pub delta_tokens: Option<u32>,
    pub finish_reason: Option<String>,
}

/// Summary of the request that was sent, retained for diagnostics without
/// keeping the full (possibly large) request body around.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RequestSummary {
    pub conversation_id: String,
    pub turn_index: usize,
    pub model: String,
    pub start_ns: u64,
    pub end_ns: u64,
    pub sent_payload_summary: String,
}

/// The full record produced by a worker for one logical request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedResponseRecord {
    pub request: RequestSummary,
    pub responses: Vec<ResponseChunk>,
    pub input_token_count: Option<u32>,
    pub output_token_count: Option<u32>,
    pub error: Option<String>,
    pub is_warmup: bool,
}

impl ParsedResponseRecord {
    /// `end_ns >= start_ns`, and for streaming records `first_chunk_ns >=
    /// start_ns` (spec §8 invariants). Used by tests and defensive asserts
    /// at the record-processor boundary.
    pub fn invariants_hold(&self) -> bool {
        if self.request.end_ns < self.request.start_ns {
            return false;
        }
        if let Some(first) = self.responses.first() {
            if first.receive_ns < self.request.start_ns {
                return false;
            }
        }
        self.responses
            .windows(2)
            .all(|w| w[0].receive_ns <= w[1].receive_ns)
    }

    pub fn first_chunk_ns(&self) -> Option<u64> {
        self.responses.first().map(|r| r.receive_ns)
    }
}

/// Opaque mapping `metric_tag -> numeric value` produced by a metric
/// computation on a single parsed record.
pub type MetricRecordDict = HashMap<&'static str, f64>;

/// An aggregated statistical summary for one metric tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricResult {
    pub tag: String,
    pub header: String,
    pub unit: String,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub std: f64,
    pub p1: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// One DCGM sample for a single GPU at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp_ns: u64,
    pub dcgm_url: String,
    pub gpu_index: u32,
    pub gpu_uuid: String,
    pub model_name: Option<String>,
    pub pci_bus_id: Option<String>,
    pub device: Option<String>,
    pub hostname: Option<String>,
    pub power_usage: Option<f64>,
    pub power_limit: Option<f64>,
    pub energy_consumption: Option<f64>,
    pub utilization: Option<f64>,
    pub memory_used_gb: Option<f64>,
    pub memory_total_gb: Option<f64>,
    pub temperature: Option<f64>,
}

/// Immutable metadata captured from the first sighting of a GPU UUID.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GpuMetadata {
    pub gpu_index: u32,
    pub model_name: Option<String>,
    pub pci_bus_id: Option<String>,
    pub hostname: Option<String>,
}

/// One metric's time series for one GPU: parallel `values`/`timestamps_ns`
/// arrays, equal length, timestamps non-decreasing (spec §3, §8 invariants).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricSeries {
    pub values: Vec<f64>,
    pub timestamps_ns: Vec<u64>,
}

impl MetricSeries {
    pub fn push(&mut self, value: f64, timestamp_ns: u64) {
        self.values.push(value);
        self.timestamps_ns.push(timestamp_ns);
    }

    pub fn invariants_hold(&self) -> bool {
        self.values.len() == self.timestamps_ns.len()
            && self.timestamps_ns.windows(2).all(|w| w[0] <= w[1])
    }
}

/// Registration state for one running service, owned by the controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceState {
    Created,
    Initializing,
    Initialized,
    Starting,
    Running,
    Stopping,
    Stopped,
    CleanedUp,
    Failed,
}

/// One GPU's aggregated telemetry (spec §6 Results JSON:
/// `endpoints: { url → { gpus: { uuid → {...}}}}`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetryGpuSummary {
    pub gpu_index: u32,
    pub gpu_name: Option<String>,
    pub metrics: HashMap<String, MetricResult>,
}

/// One `dcgm_url`'s aggregated telemetry. `reachable = false` when the
/// endpoint never returned a sample for the whole run (spec §4.9:
/// "Endpoints that never returned data are reported as unreachable").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetryEndpointSummary {
    pub reachable: bool,
    pub gpus: HashMap<String, TelemetryGpuSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetryHierarchy {
    pub endpoints: HashMap<String, TelemetryEndpointSummary>,
}

/// The results aggregator's `SUMMARIZE` response (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResults {
    pub records: Vec<MetricResult>,
    pub telemetry: Option<TelemetryHierarchy>,
    pub cancelled: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRegistration {
    pub service_id: String,
    pub service_type: String,
    pub pid: u32,
    pub state: ServiceState,
    pub last_heartbeat_ns: u64,
    pub required_clients: Vec<String>,
}
