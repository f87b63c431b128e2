//! Service lifecycle state machine, heartbeats, command dispatch, and
//! graceful shutdown shared by every AIPerf process (spec §2, §4.1).

pub mod lifecycle;
pub mod logging;
pub mod runtime;
pub mod state;

pub use lifecycle::Service;
pub use runtime::{
    Command, Heartbeat, ServiceRuntime, CONFIGURED_TOPIC, HEARTBEAT_TOPIC, REGISTER_TOPIC, command_topic,
};
