//! Maps a `--service-type` string to its concrete `Service` implementor
//! and drives it through `ServiceRuntime` (spec §4.3's per-service-type
//! dispatch, analogous to `subprocess_runner.py` picking a service class
//! by name).

use aiperf_core::config::ServiceConfig;
use aiperf_core::error::{AiPerfError, Result};
use aiperf_service::ServiceRuntime;

pub async fn run_service(service_type: &str, service_id: String, service_config: ServiceConfig) -> Result<()> {
    match service_type {
        aiperf_dataset::manager::SERVICE_TYPE => {
            let service = aiperf_dataset::DatasetManagerService::new(service_id.clone(), service_config.clone());
            ServiceRuntime::new(service_id, service_config, service).await?.run().await
        }
        aiperf_timing::service::SERVICE_TYPE => {
            let service = aiperf_timing::TimingManagerService::new(service_id.clone(), service_config.clone());
            ServiceRuntime::new(service_id, service_config, service).await?.run().await
        }
        aiperf_worker::service::SERVICE_TYPE => {
            let service = aiperf_worker::WorkerService::new(service_id.clone(), service_config.clone());
            ServiceRuntime::new(service_id, service_config, service).await?.run().await
        }
        aiperf_records::service::SERVICE_TYPE => {
            let service = aiperf_records::RecordProcessorService::new(service_id.clone(), service_config.clone());
            ServiceRuntime::new(service_id, service_config, service).await?.run().await
        }
        aiperf_aggregator::service::SERVICE_TYPE => {
            let service = aiperf_aggregator::ResultsAggregatorService::new(service_id.clone(), service_config.clone());
            ServiceRuntime::new(service_id, service_config, service).await?.run().await
        }
        aiperf_telemetry::service::SERVICE_TYPE => {
            let service = aiperf_telemetry::TelemetryManagerService::new(service_id.clone(), service_config.clone());
            ServiceRuntime::new(service_id, service_config, service).await?.run().await
        }
        other => Err(AiPerfError::configuration(format!("unknown --service-type {other}"))),
    }
}
