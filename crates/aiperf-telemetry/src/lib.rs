//! GPU telemetry collection (spec §4.9): polls DCGM Prometheus endpoints on
//! an interval, parses the fixed set of metrics AIPerf cares about, and
//! forwards per-GPU `TelemetryRecord`s to the results aggregator over the
//! bus.

pub mod collector;
pub mod prometheus;
pub mod service;

pub use collector::Collector;
pub use service::TelemetryManagerService;
