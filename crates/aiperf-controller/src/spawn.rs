//! The spawn plan (which service processes to create, spec §4.3: "exactly
//! one Dataset Manager, Timing Manager, Worker Manager, Records Manager,
//! Results Aggregator, Telemetry Manager; N Result Parser processes") and
//! the `ServiceSpawner` seam the binary's process-re-exec bootstrap plugs
//! into.
//!
//! The actual `std::process::Command::new(current_exe)` re-exec (Design
//! Notes: "spawns configured services... mirrors `subprocess_runner.py`")
//! lives in the `aiperf` binary crate, not here: this crate only needs to
//! know *that* a service type can be spawned and *whether it is still
//! alive*, not *how* the bytes get onto disk/argv.

use aiperf_core::config::ServiceConfig;

/// String constants must match each service crate's own `SERVICE_TYPE`
/// (`aiperf_dataset::manager::SERVICE_TYPE`, etc.) but are duplicated here
/// rather than pulled in as a dependency, since the controller has no other
/// reason to depend on every leaf service crate.
pub const DATASET_MANAGER: &str = "dataset_manager";
pub const TIMING_MANAGER: &str = "timing_manager";
pub const WORKER: &str = "worker";
pub const RECORD_PROCESSOR: &str = "record_processor";
pub const RESULTS_AGGREGATOR: &str = "results_aggregator";
pub const TELEMETRY_MANAGER: &str = "telemetry_manager";

/// One process the controller requires to register before the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedService {
    pub service_type: &'static str,
    pub service_id: String,
}

/// Builds the full spawn plan: one dataset manager, timing manager, results
/// aggregator, and telemetry manager; `result_parser_service_count` record
/// processors; and the computed worker count (spec §9 Open Question
/// resolution: `min(max_workers, max(min_workers, concurrency+1,
/// cpu_count-1))`).
pub fn build_plan(service_config: &ServiceConfig, concurrency: usize) -> Vec<PlannedService> {
    let worker_count = aiperf_core::config::compute_worker_count(
        service_config.max_workers,
        service_config.min_workers,
        concurrency,
        num_cpus::get(),
    );

    let mut plan = vec![
        PlannedService { service_type: DATASET_MANAGER, service_id: DATASET_MANAGER.to_string() },
        PlannedService { service_type: TIMING_MANAGER, service_id: TIMING_MANAGER.to_string() },
        PlannedService { service_type: RESULTS_AGGREGATOR, service_id: RESULTS_AGGREGATOR.to_string() },
        PlannedService { service_type: TELEMETRY_MANAGER, service_id: TELEMETRY_MANAGER.to_string() },
    ];
    for i in 0..service_config.result_parser_service_count.max(1) {
        plan.push(PlannedService { service_type: RECORD_PROCESSOR, service_id: format!("record_processor_{i}") });
    }
    for i in 0..worker_count {
        plan.push(PlannedService { service_type: WORKER, service_id: format!("worker_{i}") });
    }
    plan
}

/// A handle to one spawned child process. Implemented over
/// `std::process::Child` by the `aiperf` binary; kept as a trait here so
/// the controller's monitoring logic doesn't need to know about OS
/// processes directly (and can be exercised with a fake in tests).
pub trait SpawnedProcess: Send {
    fn pid(&self) -> u32;
    /// Non-blocking liveness check; `Ok(Some(_))` means the process has
    /// already exited.
    fn try_wait(&mut self) -> std::io::Result<Option<i32>>;
    fn kill(&mut self) -> std::io::Result<()>;
}

/// Spawns one service process of the given type/id. The binary's
/// implementation re-execs `current_exe()` with `--service-type
/// --service-id` (spec §4.3/SPEC_FULL §4.3).
pub trait ServiceSpawner: Send + Sync {
    fn spawn(&self, planned: &PlannedService) -> aiperf_core::error::Result<Box<dyn SpawnedProcess>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_includes_one_of_each_singleton_service() {
        let config = ServiceConfig { result_parser_service_count: 3, max_workers: 8, min_workers: 1, ..ServiceConfig::default() };
        let plan = build_plan(&config, 2);
        let singletons = [DATASET_MANAGER, TIMING_MANAGER, RESULTS_AGGREGATOR, TELEMETRY_MANAGER];
        for service_type in singletons {
            assert_eq!(plan.iter().filter(|p| p.service_type == service_type).count(), 1);
        }
        assert_eq!(plan.iter().filter(|p| p.service_type == RECORD_PROCESSOR).count(), 3);
    }

    #[test]
    fn plan_worker_count_uses_resolved_formula() {
        let config = ServiceConfig { max_workers: 4, min_workers: 1, ..ServiceConfig::default() };
        let plan = build_plan(&config, 100);
        assert_eq!(plan.iter().filter(|p| p.service_type == WORKER).count(), 4);
    }
}
