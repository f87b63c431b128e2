//! Process re-exec bootstrap (spec §4.3): the controller spawns each
//! planned service by re-invoking the current executable with
//! `--service-type`/`--service-id`/`--config-file`, mirroring the
//! subprocess-per-service shape of the original implementation. Grounded
//! on the teacher's own process-level isolation (one OS process per
//! `ferroid-tonic-server` instance, coordinated externally) generalized
//! to multiple service types spawned by one parent.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use aiperf_controller::{PlannedService, ServiceSpawner, SpawnedProcess};
use aiperf_core::config::ServiceConfig;
use aiperf_core::error::{AiPerfError, Result};

/// Spawns service processes by re-executing `current_exe`. The
/// `ServiceConfig` is written to a per-process JSON file rather than
/// passed as a CLI argument, so a config carrying a long `bus_addr` or
/// many overrides never risks the OS's argv length limit.
pub struct ProcessSpawner {
    exe: PathBuf,
    service_config: ServiceConfig,
    config_dir: PathBuf,
}

impl ProcessSpawner {
    pub fn new(service_config: ServiceConfig) -> Result<Self> {
        let exe = std::env::current_exe().map_err(AiPerfError::Io)?;
        let config_dir = std::env::temp_dir().join(format!("aiperf-{}", std::process::id()));
        std::fs::create_dir_all(&config_dir).map_err(AiPerfError::Io)?;
        Ok(Self { exe, service_config, config_dir })
    }
}

impl ServiceSpawner for ProcessSpawner {
    fn spawn(&self, planned: &PlannedService) -> Result<Box<dyn SpawnedProcess>> {
        let config_path = self.config_dir.join(format!("{}.json", planned.service_id));
        let body = serde_json::to_vec_pretty(&self.service_config)?;
        std::fs::write(&config_path, body).map_err(AiPerfError::Io)?;

        let child = Command::new(&self.exe)
            .arg("--service-type")
            .arg(planned.service_type)
            .arg("--service-id")
            .arg(&planned.service_id)
            .arg("--config-file")
            .arg(&config_path)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| AiPerfError::Initialization {
                service_id: planned.service_id.clone(),
                reason: format!("failed to spawn {}: {e}", planned.service_type),
            })?;

        Ok(Box::new(ChildProcess { child }))
    }
}

struct ChildProcess {
    child: Child,
}

impl SpawnedProcess for ChildProcess {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> std::io::Result<Option<i32>> {
        Ok(self.child.try_wait()?.and_then(|status| status.code()))
    }

    fn kill(&mut self) -> std::io::Result<()> {
        match self.child.try_wait() {
            Ok(Some(_)) => Ok(()),
            _ => self.child.kill(),
        }
    }
}
