//! `aiperf`: distributed load-generation and measurement for AI inference
//! endpoints (spec §1 overview). Two run modes share this one binary,
//! selected by whether `--service-type` is present:
//!
//! - top-level `aiperf --model ... --url ...`: runs the
//!   [`aiperf_controller::Controller`], which spawns every planned
//!   service as a re-exec'd child of itself and drives the run;
//! - re-exec'd child `aiperf --service-type worker --service-id worker_0
//!   --config-file ...`: runs that one service to completion.
//!
//! Grounded on the teacher's `main.rs` (`CliArgs::parse()` ->
//! `TryFrom<CliArgs>` -> run -> map error to process exit).

mod bootstrap;
mod cli;
mod dispatch;
mod telemetry;

use clap::Parser;

use aiperf_core::config::{ServiceConfig, UserConfig};
use aiperf_core::error::AiPerfError;
use cli::CliArgs;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    let exit_code = run(args).await;
    std::process::exit(exit_code);
}

async fn run(args: CliArgs) -> i32 {
    if args.is_child_service() {
        return run_child(args).await;
    }
    run_controller(args).await
}

async fn run_child(args: CliArgs) -> i32 {
    let Some(service_type) = args.service_type.clone() else { return 1 };
    let Some(service_id) = args.service_id.clone() else { return 1 };
    let Some(config_path) = args.config_file.clone() else { return 1 };

    let service_config = match std::fs::read(&config_path).map_err(AiPerfError::Io).and_then(|bytes| {
        serde_json::from_slice::<ServiceConfig>(&bytes).map_err(AiPerfError::from)
    }) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to read service config at {}: {err}", config_path.display());
            return 1;
        }
    };

    let _otel_guard = match telemetry::init_otel(&service_config.log_level, args.log_json) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("failed to initialize telemetry: {err}");
            return 1;
        }
    };

    match dispatch::run_service(&service_type, service_id, service_config).await {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(error = %err, "service exited with error");
            err.exit_code()
        }
    }
}

async fn run_controller(args: CliArgs) -> i32 {
    let service_config = match ServiceConfig::try_from(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return err.exit_code();
        }
    };
    let _otel_guard = match telemetry::init_otel(&service_config.log_level, args.log_json) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("failed to initialize telemetry: {err}");
            return 1;
        }
    };

    let user_config = match UserConfig::try_from(&args) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            return err.exit_code();
        }
    };

    let spawner = match bootstrap::ProcessSpawner::new(service_config.clone()) {
        Ok(spawner) => spawner,
        Err(err) => {
            tracing::error!(error = %err, "failed to prepare service spawner");
            return err.exit_code();
        }
    };

    let controller = aiperf_controller::Controller::new(service_config);
    tokio::select! {
        result = controller.run(user_config, &spawner) => match result {
            Ok(final_results) => {
                tracing::info!(
                    requests = final_results.records.iter().find(|r| r.tag == "request_count").map(|r| r.count).unwrap_or(0),
                    cancelled = final_results.cancelled,
                    "profile run complete"
                );
                0
            }
            Err(err) => {
                tracing::error!(error = %err, "profile run failed");
                err.exit_code()
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, shutting down");
            130
        }
    }
}
