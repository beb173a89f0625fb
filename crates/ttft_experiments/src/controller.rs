//! Sequential sweep execution over the configuration grid.
//!
//! Cells run one at a time in grid order with a cool-down between them. Each
//! cell's artifacts from an earlier sweep are removed before it runs. A
//! failed cell is logged and skipped; only configuration problems and an
//! unusable results directory abort the sweep, and both are detected before
//! the first cell starts. Aggregation runs once, after the last cell.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ttft_core::contract::normalize_profile;
use ttft_core::grid::enumerate_grid;
use ttft_core::storage_keys::{artifact_path, profile_results_dir, ArtifactKind};
use ttft_core::{ConfigError, RunSpec, SweepProfile};

use crate::aggregate::{ResultAggregator, SweepReport};
use crate::artifact::{remove_run_artifacts, ArtifactError};
use crate::executor::{RunExecutor, RunOutcome, RunStatus};
use crate::manifest::{read_manifest, write_manifest, SweepManifest};
use crate::progress::progress_bar;

/// Time source for the controller; tests substitute a manual clock.
pub trait SweepClock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SweepClock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("invalid sweep configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot create results directory {path}: {source}")]
    ResultsDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write sweep manifest: {0}")]
    Manifest(#[source] ArtifactError),
    #[error("cannot fingerprint sweep profile: {0}")]
    Fingerprint(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOptions {
    pub show_progress: bool,
}

#[derive(Debug, Clone)]
pub struct SweepSummary {
    pub profile_name: String,
    pub results_dir: PathBuf,
    pub outcomes: Vec<RunOutcome>,
    /// Present when the aggregator ran in process and succeeded.
    pub report: Option<SweepReport>,
    /// Fingerprint of a different profile that previously swept into the same directory.
    pub replaced_fingerprint: Option<String>,
}

impl SweepSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status.is_success())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

pub fn run_sweep(
    profile: &SweepProfile,
    results_root: &Path,
    executor: &dyn RunExecutor,
    aggregator: &dyn ResultAggregator,
    options: SweepOptions,
) -> Result<SweepSummary, SweepError> {
    run_sweep_with_clock(
        profile,
        results_root,
        executor,
        aggregator,
        &SystemClock,
        options,
    )
}

pub fn run_sweep_with_clock(
    profile: &SweepProfile,
    results_root: &Path,
    executor: &dyn RunExecutor,
    aggregator: &dyn ResultAggregator,
    clock: &dyn SweepClock,
    options: SweepOptions,
) -> Result<SweepSummary, SweepError> {
    let profile = normalize_profile(profile.clone())?;
    let cells = enumerate_grid(&profile)?;
    let specs = cells
        .iter()
        .map(|cell| cell.run_spec(&profile))
        .collect::<Result<Vec<RunSpec>, ConfigError>>()?;

    let results_dir = profile_results_dir(results_root, &profile.name);
    fs::create_dir_all(&results_dir).map_err(|source| SweepError::ResultsDir {
        path: results_dir.clone(),
        source,
    })?;

    let mut manifest = SweepManifest::new(&profile, specs.iter().map(RunSpec::tag).collect())
        .map_err(SweepError::Fingerprint)?;
    let replaced_fingerprint = previous_fingerprint(&results_dir)
        .filter(|previous| *previous != manifest.profile_fingerprint);
    if let Some(previous) = &replaced_fingerprint {
        tracing::warn!(
            profile = %profile.name,
            previous_fingerprint = %previous,
            fingerprint = %manifest.profile_fingerprint,
            "results directory holds a different profile's sweep"
        );
    }
    write_manifest(&results_dir, &manifest).map_err(SweepError::Manifest)?;

    tracing::info!(
        profile = %profile.name,
        cells = specs.len(),
        cooldown_ms = profile.cooldown_ms,
        results_dir = %results_dir.display(),
        "starting sweep"
    );

    let progress = progress_bar(specs.len() as u64, options.show_progress);
    let sweep_start = clock.now();
    let mut outcomes = Vec::with_capacity(specs.len());

    for (index, spec) in specs.iter().enumerate() {
        if index > 0 && !profile.cooldown().is_zero() {
            tracing::debug!(cooldown_ms = profile.cooldown_ms, "cooling down");
            clock.sleep(profile.cooldown());
        }

        let tag = spec.tag();
        if let Some(bar) = &progress {
            bar.set_message(tag.to_string());
        }
        tracing::info!(
            run_tag = %tag,
            max_inflight = spec.max_inflight(),
            concurrency = spec.concurrency(),
            cell = index + 1,
            total = specs.len(),
            "starting run"
        );

        match remove_run_artifacts(&results_dir, tag) {
            Ok(0) => {}
            Ok(removed) => {
                tracing::debug!(run_tag = %tag, removed, "removed artifacts of an earlier sweep")
            }
            Err(error) => {
                tracing::warn!(run_tag = %tag, error = %error, "cannot remove earlier artifacts")
            }
        }

        let started = clock.now();
        let report = executor.execute(spec, &results_dir);
        let elapsed = clock.now().saturating_duration_since(started);

        let artifact = report
            .artifact
            .unwrap_or_else(|| artifact_path(&results_dir, ArtifactKind::Results, tag));
        let artifact_present = artifact.is_file();

        match &report.status {
            RunStatus::Success => tracing::info!(
                run_tag = %tag,
                elapsed_ms = elapsed.as_millis() as u64,
                "run succeeded"
            ),
            RunStatus::Failure { reason } => tracing::warn!(
                run_tag = %tag,
                reason = %reason,
                artifact_present,
                "run failed, continuing with next cell"
            ),
        }

        outcomes.push(RunOutcome {
            run_tag: tag,
            cell_index: index,
            status: report.status,
            artifact,
            artifact_present,
            started_offset_ms: started.saturating_duration_since(sweep_start).as_millis() as u64,
            elapsed_ms: elapsed.as_millis() as u64,
        });

        if let Some(bar) = &progress {
            bar.inc(1);
        }
    }

    if let Some(bar) = &progress {
        bar.finish_with_message("sweep complete");
    }

    manifest.complete(outcomes.clone());
    if let Err(error) = write_manifest(&results_dir, &manifest) {
        tracing::warn!(error = %error, "failed to record sweep outcomes in manifest");
    }

    let succeeded = outcomes.iter().filter(|o| o.status.is_success()).count();
    tracing::info!(
        succeeded,
        failed = outcomes.len() - succeeded,
        "sweep finished, aggregating results"
    );

    let report = match aggregator.aggregate(&results_dir) {
        Ok(report) => report,
        Err(error) => {
            tracing::warn!(error = %error, "aggregation failed");
            None
        }
    };

    Ok(SweepSummary {
        profile_name: profile.name,
        results_dir,
        outcomes,
        report,
        replaced_fingerprint,
    })
}

/// Fingerprint recorded by an earlier sweep into `results_dir`, if readable.
fn previous_fingerprint(results_dir: &Path) -> Option<String> {
    match read_manifest(results_dir) {
        Ok(manifest) => manifest.map(|manifest| manifest.profile_fingerprint),
        Err(error) => {
            tracing::warn!(error = %error, "ignoring unreadable manifest of an earlier sweep");
            None
        }
    }
}
