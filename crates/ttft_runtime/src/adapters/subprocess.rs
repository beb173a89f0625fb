//! Executor and aggregator backed by external programs.
//!
//! The measurement client is invoked with the positional contract
//! `<concurrency> <request_count> <prompt> <max_tokens> <run_tag> [prometheus_url]`.
//! Settings that do not fit the contract travel through environment variables.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use ttft_core::storage_keys::{artifact_path, ArtifactKind};
use ttft_core::RunSpec;
use ttft_experiments::aggregate::{AggregateError, ResultAggregator, SweepReport};
use ttft_experiments::executor::{ExecutionReport, FailureReason, RunExecutor, RunStatus};

use crate::cli::{BudgetMode, ENV_MAX_INFLIGHT, ENV_REQUEST_BUDGET, ENV_RESULTS_DIR, ENV_TARGET};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Positional arguments for one run, in contract order.
pub fn client_args(spec: &RunSpec, prometheus_url: Option<&str>) -> Vec<String> {
    let mut args = vec![
        spec.concurrency().to_string(),
        spec.request_budget().count().to_string(),
        spec.prompt().to_string(),
        spec.max_output_tokens().to_string(),
        spec.tag().to_string(),
    ];
    if let Some(url) = prometheus_url {
        args.push(url.to_string());
    }
    args
}

#[derive(Debug, Clone)]
pub struct SubprocessExecutor {
    program: PathBuf,
    leading_args: Vec<String>,
    target: Option<String>,
    prometheus_url: Option<String>,
    poll_interval: Duration,
}

impl SubprocessExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            target: None,
            prometheus_url: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Arguments placed before the positional contract.
    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    pub fn with_target(mut self, target: Option<String>) -> Self {
        self.target = target;
        self
    }

    pub fn with_prometheus_url(mut self, url: Option<String>) -> Self {
        self.prometheus_url = url;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn command(&self, spec: &RunSpec, results_dir: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .args(client_args(spec, self.prometheus_url.as_deref()))
            .env(ENV_RESULTS_DIR, results_dir)
            .env(ENV_MAX_INFLIGHT, spec.max_inflight().to_string())
            .env(
                ENV_REQUEST_BUDGET,
                BudgetMode::of(spec.request_budget()).as_arg(),
            );
        if let Some(target) = &self.target {
            command.env(ENV_TARGET, target);
        }
        command
    }
}

impl RunExecutor for SubprocessExecutor {
    fn execute(&self, spec: &RunSpec, results_dir: &Path) -> ExecutionReport {
        let artifact = artifact_path(results_dir, ArtifactKind::Results, spec.tag());

        let mut child = match self.command(spec, results_dir).spawn() {
            Ok(child) => child,
            Err(error) => {
                return ExecutionReport::failure(FailureReason::LaunchFailed {
                    message: format!("{}: {error}", self.program.display()),
                })
            }
        };
        tracing::debug!(run_tag = %spec.tag(), pid = child.id(), "measurement client started");

        let status = match wait_with_timeout(&mut child, spec.timeout(), self.poll_interval) {
            Ok(Some(exit)) if exit.success() => RunStatus::Success,
            Ok(Some(exit)) => RunStatus::failure(FailureReason::NonZeroExit { code: exit.code() }),
            Ok(None) => RunStatus::failure(FailureReason::Timeout {
                after_secs: spec.timeout().map_or(0, |limit| limit.as_secs()),
            }),
            Err(error) => RunStatus::failure(FailureReason::LaunchFailed {
                message: format!("lost track of child process: {error}"),
            }),
        };

        ExecutionReport {
            artifact: (status.is_success() || artifact.exists()).then_some(artifact),
            status,
        }
    }
}

/// `Ok(None)` means the child was killed after exceeding `timeout`.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Option<Duration>,
    poll_interval: Duration,
) -> io::Result<Option<ExitStatus>> {
    let Some(limit) = timeout else {
        return child.wait().map(Some);
    };

    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if started.elapsed() >= limit {
            if let Err(error) = child.kill() {
                tracing::warn!(%error, "failed to kill timed-out client");
            }
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(poll_interval.min(limit.saturating_sub(started.elapsed())));
    }
}

/// Runs `program [args..] <results_dir>` and consumes only its exit status.
#[derive(Debug, Clone)]
pub struct SubprocessAggregator {
    program: PathBuf,
    leading_args: Vec<String>,
}

impl SubprocessAggregator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }
}

impl ResultAggregator for SubprocessAggregator {
    fn aggregate(&self, results_dir: &Path) -> Result<Option<SweepReport>, AggregateError> {
        let status = Command::new(&self.program)
            .args(&self.leading_args)
            .arg(results_dir)
            .status()
            .map_err(|error| {
                AggregateError::Process(format!("{}: {error}", self.program.display()))
            })?;

        if status.success() {
            Ok(None)
        } else {
            Err(AggregateError::Process(format!(
                "{} exited with {status}",
                self.program.display()
            )))
        }
    }
}
