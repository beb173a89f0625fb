//! Run execution: one attempt of one grid cell.
//!
//! Executors never return errors to the controller. Every way a run can go
//! wrong is folded into [`RunStatus::Failure`] so the sweep keeps going.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use ttft_core::{RunSpec, RunTag};

use crate::artifact::{persist_run_artifacts, ArtifactError, QueueDepthSnapshot, RunArtifacts};
use crate::loadgen::{run_load, LoadError, LoadPlan, StreamingEndpoint};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    NonZeroExit { code: Option<i32> },
    Timeout { after_secs: u64 },
    LaunchFailed { message: String },
    LoadFailed { message: String },
    NoSuccessfulRequests,
    ArtifactWrite { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonZeroExit { code: Some(code) } => write!(f, "exited with status {code}"),
            Self::NonZeroExit { code: None } => write!(f, "terminated by signal"),
            Self::Timeout { after_secs } => write!(f, "timed out after {after_secs}s"),
            Self::LaunchFailed { message } => write!(f, "failed to launch: {message}"),
            Self::LoadFailed { message } => write!(f, "load generation failed: {message}"),
            Self::NoSuccessfulRequests => write!(f, "no request produced a first token"),
            Self::ArtifactWrite { message } => write!(f, "failed to write artifacts: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure { reason: FailureReason },
}

impl RunStatus {
    pub fn failure(reason: FailureReason) -> Self {
        Self::Failure { reason }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// What an executor hands back for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub status: RunStatus,
    /// Artifact the executor wrote, when it knows.
    pub artifact: Option<PathBuf>,
}

impl ExecutionReport {
    pub fn success(artifact: impl Into<PathBuf>) -> Self {
        Self {
            status: RunStatus::Success,
            artifact: Some(artifact.into()),
        }
    }

    pub fn failure(reason: FailureReason) -> Self {
        Self {
            status: RunStatus::failure(reason),
            artifact: None,
        }
    }
}

/// Executes one fully specified run and writes its artifact into `results_dir`.
///
/// One call is one attempt; implementations must not retry.
pub trait RunExecutor {
    fn execute(&self, spec: &RunSpec, results_dir: &Path) -> ExecutionReport;
}

/// Immutable record of a finished cell, kept in the sweep manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_tag: RunTag,
    pub cell_index: usize,
    #[serde(flatten)]
    pub status: RunStatus,
    pub artifact: PathBuf,
    pub artifact_present: bool,
    /// Start of the cell, relative to the start of the sweep.
    pub started_offset_ms: u64,
    pub elapsed_ms: u64,
}

/// Reads server-side queue depth around a run.
pub trait QueueDepthProbe: Send + Sync {
    fn queue_depth(&self) -> Option<f64>;
}

#[derive(Debug, thiserror::Error)]
pub enum MeasureError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Drive one run in process and persist its artifacts.
pub fn measure_run(
    endpoint: &dyn StreamingEndpoint,
    spec: &RunSpec,
    results_dir: &Path,
    queue_probe: Option<&dyn QueueDepthProbe>,
    show_progress: bool,
) -> Result<RunArtifacts, MeasureError> {
    let before = queue_probe.and_then(|probe| probe.queue_depth());
    let records = run_load(endpoint, &LoadPlan::from_spec(spec), show_progress)?;
    let after = queue_probe.and_then(|probe| probe.queue_depth());

    let artifacts = persist_run_artifacts(
        results_dir,
        spec,
        &endpoint.describe(),
        &records,
        QueueDepthSnapshot { before, after },
    )?;
    Ok(artifacts)
}

/// Executor that generates load from this process instead of spawning a client.
pub struct LoadgenExecutor<E> {
    endpoint: E,
    queue_probe: Option<Box<dyn QueueDepthProbe>>,
    show_progress: bool,
}

impl<E: StreamingEndpoint> LoadgenExecutor<E> {
    pub fn new(endpoint: E) -> Self {
        Self {
            endpoint,
            queue_probe: None,
            show_progress: false,
        }
    }

    pub fn with_queue_probe(mut self, probe: Box<dyn QueueDepthProbe>) -> Self {
        self.queue_probe = Some(probe);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}

impl<E: StreamingEndpoint> RunExecutor for LoadgenExecutor<E> {
    fn execute(&self, spec: &RunSpec, results_dir: &Path) -> ExecutionReport {
        match measure_run(
            &self.endpoint,
            spec,
            results_dir,
            self.queue_probe.as_deref(),
            self.show_progress,
        ) {
            Ok(artifacts) if artifacts.metrics.successful_requests == 0 => ExecutionReport {
                status: RunStatus::failure(FailureReason::NoSuccessfulRequests),
                artifact: Some(artifacts.results_csv),
            },
            Ok(artifacts) => ExecutionReport::success(artifacts.results_csv),
            Err(MeasureError::Load(error)) => {
                ExecutionReport::failure(FailureReason::LoadFailed {
                    message: error.to_string(),
                })
            }
            Err(MeasureError::Artifact(error)) => {
                ExecutionReport::failure(FailureReason::ArtifactWrite {
                    message: error.to_string(),
                })
            }
        }
    }
}
