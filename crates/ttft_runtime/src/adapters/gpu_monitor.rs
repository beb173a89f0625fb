use std::fs::File;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use ttft_core::storage_keys::{artifact_path, ArtifactKind};
use ttft_core::RunTag;

const NVIDIA_SMI: &str = "nvidia-smi";
const DMON_ARGS: [&str; 7] = ["dmon", "-s", "pucm", "-d", "1", "-o", "T"];

/// Background `nvidia-smi dmon` capture for one run.
pub struct GpuMonitor {
    child: Child,
    log_path: PathBuf,
}

impl GpuMonitor {
    /// Start capturing into `gpu_metrics_{tag}.log`. `None` when monitoring is unavailable.
    pub fn start(results_dir: &Path, tag: RunTag) -> Option<Self> {
        let mut command = Command::new(NVIDIA_SMI);
        command.args(DMON_ARGS);
        Self::start_with_command(command, artifact_path(results_dir, ArtifactKind::GpuMetrics, tag))
    }

    pub fn start_with_command(mut command: Command, log_path: PathBuf) -> Option<Self> {
        match spawn_into(&mut command, &log_path) {
            Ok(child) => {
                tracing::info!(log = %log_path.display(), "gpu monitoring started");
                Some(Self { child, log_path })
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {
                tracing::warn!("{NVIDIA_SMI} not found, skipping gpu monitoring");
                None
            }
            Err(error) => {
                tracing::warn!(%error, "gpu monitoring could not start");
                None
            }
        }
    }

    /// Stop the capture and return the log location.
    pub fn stop(mut self) -> PathBuf {
        self.terminate();
        std::mem::take(&mut self.log_path)
    }

    fn terminate(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            if let Err(error) = self.child.kill() {
                tracing::warn!(%error, "failed to stop gpu monitor");
            }
        }
        let _ = self.child.wait();
    }
}

impl Drop for GpuMonitor {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn spawn_into(command: &mut Command, log_path: &Path) -> io::Result<Child> {
    let log = File::create(log_path)?;
    let spawned = command
        .stdin(Stdio::null())
        .stdout(log)
        .stderr(Stdio::null())
        .spawn();
    if spawned.is_err() {
        let _ = std::fs::remove_file(log_path);
    }
    spawned
}
