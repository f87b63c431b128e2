//! Results Aggregator (spec §4.8): per-tag metric arrays, the telemetry
//! hierarchy (spec §4.9), the JSON/CSV export formats (spec §6), and the
//! `ResultsAggregatorService` that ties them together.

pub mod export;
pub mod service;
pub mod store;
pub mod telemetry;

pub use service::ResultsAggregatorService;
pub use store::MetricStore;
pub use telemetry::TelemetryStore;
