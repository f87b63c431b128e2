//! The `Service` trait every process-level component implements. Grounded
//! on the teacher's `tonic::async_trait impl IdGenerator` seam
//! (`server/service/handler.rs`): an async trait object the runtime drives,
//! rather than the original's `@on_init`/`@on_start`/`@on_stop` decorators.

use async_trait::async_trait;

use aiperf_core::config::UserConfig;
use aiperf_core::error::Result;

/// Lifecycle hooks a service implements. `on_run` carries the service's
/// main work loop and is expected to run until `shutdown` fires; the other
/// hooks are one-shot.
#[async_trait]
pub trait Service: Send + Sync {
    /// Stable type name used for registration and process re-exec dispatch
    /// (e.g. `"worker"`, `"timing_manager"`).
    fn service_type(&self) -> &'static str;

    /// Other service types that must have registered before this service's
    /// `on_start` is invoked (spec §4.1: registration gating).
    fn required_clients(&self) -> Vec<String> {
        Vec::new()
    }

    async fn on_init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Receives the benchmark's `UserConfig` in response to the
    /// controller's `PROFILE_CONFIGURE` command (spec §4.3), after
    /// registration and before `on_start`.
    async fn on_configure(&mut self, _user_config: UserConfig) -> Result<()> {
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// The service's main work loop. Implementations should select on
    /// `shutdown.cancelled()` alongside their own event sources and return
    /// once cancelled.
    async fn on_run(&mut self, shutdown: tokio_util::sync::CancellationToken) -> Result<()> {
        shutdown.cancelled().await;
        Ok(())
    }

    async fn on_stop(&mut self) -> Result<()> {
        Ok(())
    }

    async fn on_cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}
