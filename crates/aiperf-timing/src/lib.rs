//! Credit-based load generator (spec §4.5): the timing manager decides when
//! to emit each `Credit` under concurrency, request-rate, or fixed-schedule
//! mode, and the workers race to pull them off the bus.

pub mod cancellation;
pub mod concurrency;
pub mod fixed_schedule;
pub mod rate;
pub mod service;

pub use service::TimingManagerService;
