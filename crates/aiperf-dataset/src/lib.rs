//! Dataset manager (spec §4.4): synthetic, custom-file, fixed-schedule, and
//! mooncake-trace conversation construction, plus the `DatasetManager`
//! service that serves conversations by `session_id` over the bus.

pub mod custom;
pub mod dataset;
pub mod manager;
pub mod media;
pub mod prompt;
pub mod synthetic;

pub use custom::{CustomDataset, load_fixed_schedule};
pub use dataset::{DatasetStore, ScheduleEntry};
pub use manager::DatasetManagerService;
