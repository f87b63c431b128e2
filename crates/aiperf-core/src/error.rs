//! Error taxonomy for the AIPerf runtime (spec §7).
//!
//! `NoMetricValue` is deliberately absent here: a metric that cannot be
//! computed for a record is not an error, it's represented as `Option::None`
//! at the call site (see `aiperf-records`).

use thiserror::Error;

pub type Result<T> = core::result::Result<T, AiPerfError>;

/// Unified error type shared by every service in the runtime.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AiPerfError {
    /// Invalid or contradictory configuration. Fatal before a run starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A service failed to initialize (resource, parse, bind).
    #[error("service {service_id} failed to initialize: {reason}")]
    Initialization { service_id: String, reason: String },

    /// Not all required services registered within `registration_timeout`.
    #[error("registration timed out waiting for: {missing:?}")]
    RegistrationTimeout { missing: Vec<String> },

    /// A required service stopped heartbeating.
    #[error("heartbeat lost for service {service_id}")]
    HeartbeatLost { service_id: String },

    /// Message bus send/receive failure. Logged; the affected operation
    /// fails locally and does not poison the rest of the run.
    #[error("transport error: {context}")]
    Transport { context: String },

    /// HTTP timeout, connect failure, non-2xx, or stream parse error inside
    /// a worker. Captured into the record's `error` field rather than
    /// propagated, but the type is shared so callers can format it
    /// consistently.
    #[error("request error: {context}")]
    Request { context: String },

    /// Failure to write final result artifacts.
    #[error("export error: {0}")]
    Export(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl AiPerfError {
    pub fn transport(context: impl Into<String>) -> Self {
        Self::Transport {
            context: context.into(),
        }
    }

    pub fn request(context: impl Into<String>) -> Self {
        Self::Request {
            context: context.into(),
        }
    }

    pub fn configuration(context: impl Into<String>) -> Self {
        Self::Configuration(context.into())
    }

    /// Process exit code per spec §6/§7: 0 success, 1 config error,
    /// 2 runtime failure, 130 interrupted (handled separately by the
    /// signal handler, not via this mapping).
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Initialization { .. }
            | Self::RegistrationTimeout { .. }
            | Self::HeartbeatLost { .. } => 2,
            Self::Transport { .. } | Self::Request { .. } | Self::Export(_) => 2,
            Self::Io(_) | Self::Serde(_) => 2,
        }
    }
}
