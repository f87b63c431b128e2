//! Well-known topic names for the benchmark data plane (spec §2 control
//! flow), as opposed to the service-framework topics in `aiperf-service`
//! (`REGISTER`/`HEARTBEAT`/per-service commands). Centralized here so every
//! crate that talks to the bus agrees on the wire vocabulary without
//! depending on each other.

/// Push topic: timing manager drops credits, workers pull-register as
/// competing consumers (spec §4.5, §4.6).
pub const CREDIT_DROP_TOPIC: &str = "credit.drop";
/// Push topic: workers return a completed credit, timing manager
/// pull-registers as the sole consumer (spec §3 credit lifecycle).
pub const CREDIT_RETURN_TOPIC: &str = "credit.return";
/// Push topic: workers push `ParsedResponseRecord`s, record processors
/// pull-register as competing consumers (spec §4.6 step 5, §4.7).
pub const RECORDS_TOPIC: &str = "records.raw";
/// Push topic: record processors push per-record metric dicts to the
/// results aggregator (spec §4.7).
pub const METRICS_TOPIC: &str = "records.metrics";
/// Push topic: telemetry collectors push `TelemetryRecord`s to the results
/// aggregator (spec §4.9).
pub const TELEMETRY_TOPIC: &str = "telemetry.records";
/// Publish topic: timing manager's periodic progress messages (spec §4.5:
/// "published at most every `progress_interval_seconds`").
pub const PROGRESS_TOPIC: &str = "run.progress";
/// Publish topic: timing manager signals credit emission is done (spec
/// §4.5 completion criteria).
pub const CREDITS_COMPLETE_TOPIC: &str = "run.credits_complete";
/// Publish topic: results aggregator's `FinalResults` at the end of a run
/// (spec §4.3, §4.8).
pub const FINAL_RESULTS_TOPIC: &str = "run.final_results";
