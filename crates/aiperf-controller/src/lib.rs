//! Service Controller (spec §4.2, §4.3): owns the bus broker, spawns the
//! planned set of service processes, and drives one benchmark run through
//! registration, configure, start, monitoring, and summarization.

pub mod controller;
pub mod registry;
pub mod spawn;

pub use controller::Controller;
pub use registry::Registry;
pub use spawn::{PlannedService, ServiceSpawner, SpawnedProcess};
