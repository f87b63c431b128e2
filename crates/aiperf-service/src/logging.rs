//! Logging setup shared by every process, grounded on the teacher's
//! `tracing-subscriber` usage in `server/telemetry.rs` (env-filter driven,
//! with a structured JSON mode for log aggregation). This is the default
//! path used by every service; the `aiperf` bin crate's `otel` feature
//! (see its `telemetry.rs`) layers OpenTelemetry trace export on top when
//! built with it, mirroring the teacher's own feature-gated
//! `init_telemetry`. AIPerf's own telemetry surface (spec §4.9) is GPU
//! metrics via `aiperf-telemetry`, not process tracing — this module and
//! its optional OTel layer are purely ambient observability.

use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber. `structured` selects JSON
/// output (for the `--use-structured-logging` path in the Design Notes)
/// over the default human-readable format.
pub fn init_logging(log_level: &str, structured: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    if structured {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}
