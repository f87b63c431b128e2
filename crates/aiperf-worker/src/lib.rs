//! Worker processes (spec §4.6): pulls credits off the bus, drives the
//! per-turn HTTP request pipeline, and emits parsed response records.

pub mod builders;
pub mod parsers;
pub mod request;
pub mod service;

pub use request::RequestPipeline;
pub use service::WorkerService;
