//! Record processor pool (spec §4.7): per-record metric computations, the
//! raw-record JSONL writer, and the `RecordProcessorService` that ties them
//! together.

pub mod computations;
pub mod service;
pub mod writer;

pub use computations::{compute_all, COMPUTATIONS};
pub use service::RecordProcessorService;
pub use writer::RawRecordWriter;
