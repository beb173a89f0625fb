use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use ttft_core::contract::normalize_profile;
use ttft_core::grid::enumerate_grid;
use ttft_core::storage_keys::profile_results_dir;
use ttft_core::SweepProfile;
use ttft_experiments::aggregate::{ArtifactAggregator, ResultAggregator};
use ttft_experiments::controller::{run_sweep, SweepOptions};
use ttft_experiments::executor::{LoadgenExecutor, RunExecutor};
use ttft_experiments::profiles::{profile_by_name, profile_names};
use ttft_runtime::adapters::http_stream::{HttpStreamEndpoint, DEFAULT_REQUEST_TIMEOUT};
use ttft_runtime::adapters::prometheus::PrometheusClient;
use ttft_runtime::adapters::subprocess::{client_args, SubprocessAggregator, SubprocessExecutor};
use ttft_runtime::cli::{BudgetMode, DEFAULT_TARGET, ENV_TARGET};
use ttft_runtime::telemetry::{init_logging, LogFormat};

const MEASURE_BINARY: &str = "measure_ttft";
const PROMETHEUS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(about = "Sweep max-inflight and concurrency, one run per grid cell")]
struct Args {
    /// Built-in profile.
    #[arg(long, default_value = "quick", conflicts_with = "profile_file")]
    profile: String,
    /// JSON profile instead of a built-in one.
    #[arg(long)]
    profile_file: Option<PathBuf>,

    #[arg(long, value_delimiter = ',')]
    max_inflight: Option<Vec<u32>>,
    #[arg(long, value_delimiter = ',')]
    concurrency: Option<Vec<u32>>,
    #[arg(long)]
    request_count: Option<u32>,
    #[arg(long, value_enum)]
    budget: Option<BudgetMode>,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    max_tokens: Option<u32>,
    #[arg(long)]
    cooldown_secs: Option<u64>,
    #[arg(long)]
    run_timeout_secs: Option<u64>,

    #[arg(long, env = "TTFT_RESULTS_ROOT", default_value = "results")]
    results_root: PathBuf,

    /// Measurement client; defaults to the `measure_ttft` next to this binary.
    #[arg(long, conflicts_with = "in_process")]
    executor: Option<PathBuf>,
    /// Argument placed before the positional contract; repeatable.
    #[arg(long = "executor-arg", allow_hyphen_values = true)]
    executor_args: Vec<String>,
    /// Generate load from this process instead of spawning a client per run.
    #[arg(long)]
    in_process: bool,
    #[arg(long, env = ENV_TARGET)]
    target: Option<String>,
    #[arg(long)]
    prometheus_url: Option<String>,
    /// External aggregator invoked with the results directory.
    #[arg(long)]
    aggregator: Option<PathBuf>,

    #[arg(long)]
    no_progress: bool,
    /// With `--in-process`, show a per-request bar for each run instead of the sweep bar.
    #[arg(long, requires = "in_process")]
    run_progress: bool,
    /// Print the grid and exit.
    #[arg(long)]
    dry_run: bool,
    #[arg(long, value_enum, default_value_t)]
    log_format: LogFormat,
}

/// Which progress bars are drawn. At most one is active, since both render to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProgressModes {
    sweep: bool,
    run: bool,
}

impl Args {
    fn progress_modes(&self) -> ProgressModes {
        let run = self.in_process && self.run_progress && !self.no_progress;
        ProgressModes {
            sweep: !self.no_progress && !run,
            run,
        }
    }

    fn profile(&self) -> anyhow::Result<SweepProfile> {
        let mut profile = match &self.profile_file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read {}", path.display()))?;
                serde_json::from_str::<SweepProfile>(&text)
                    .with_context(|| format!("invalid profile {}", path.display()))?
            }
            None => profile_by_name(&self.profile).ok_or_else(|| {
                anyhow!(
                    "unknown profile {:?}, expected one of {}",
                    self.profile,
                    profile_names().join(", ")
                )
            })?,
        };

        if let Some(values) = &self.max_inflight {
            profile.max_inflight = values.clone();
        }
        if let Some(values) = &self.concurrency {
            profile.concurrency = values.clone();
        }
        let mode = self
            .budget
            .unwrap_or_else(|| BudgetMode::of(profile.request_budget));
        let count = self
            .request_count
            .unwrap_or_else(|| profile.request_budget.count());
        profile.request_budget = mode.budget(count);
        if let Some(prompt) = &self.prompt {
            profile.prompt = prompt.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            profile.max_output_tokens = max_tokens;
        }
        if let Some(cooldown) = self.cooldown_secs {
            profile.cooldown_ms = cooldown.saturating_mul(1_000);
        }
        if let Some(timeout) = self.run_timeout_secs {
            profile.run_timeout_secs = Some(timeout);
        }

        Ok(normalize_profile(profile)?)
    }

    fn executor(&self) -> anyhow::Result<Box<dyn RunExecutor>> {
        if self.in_process {
            let target = self.target.as_deref().unwrap_or(DEFAULT_TARGET);
            let endpoint = HttpStreamEndpoint::new(target, DEFAULT_REQUEST_TIMEOUT)
                .context("cannot build HTTP client")?;
            let mut executor =
                LoadgenExecutor::new(endpoint).with_progress(self.progress_modes().run);
            if let Some(url) = &self.prometheus_url {
                let client = PrometheusClient::new(url, PROMETHEUS_TIMEOUT)
                    .context("cannot build Prometheus client")?;
                executor = executor.with_queue_probe(Box::new(client));
            }
            return Ok(Box::new(executor));
        }

        Ok(Box::new(
            SubprocessExecutor::new(self.client_program()?)
                .with_leading_args(self.executor_args.clone())
                .with_target(self.target.clone())
                .with_prometheus_url(self.prometheus_url.clone()),
        ))
    }

    fn client_program(&self) -> anyhow::Result<PathBuf> {
        if let Some(program) = &self.executor {
            return Ok(program.clone());
        }
        let current = std::env::current_exe().context("cannot locate this executable")?;
        Ok(current.with_file_name(format!(
            "{MEASURE_BINARY}{}",
            std::env::consts::EXE_SUFFIX
        )))
    }

    fn aggregator(&self) -> Box<dyn ResultAggregator> {
        match &self.aggregator {
            Some(program) => Box::new(SubprocessAggregator::new(program)),
            None => Box::new(ArtifactAggregator::default()),
        }
    }
}

fn print_plan(profile: &SweepProfile, results_root: &Path, args: &Args) -> anyhow::Result<()> {
    println!(
        "Profile {} -> {}",
        profile.name,
        profile_results_dir(results_root, &profile.name).display()
    );
    println!(
        "{} cells, {} requests each ({}), cool-down {}s",
        profile.total_cells(),
        profile.request_budget.count(),
        profile.request_budget.mode_name(),
        profile.cooldown().as_secs()
    );
    for cell in enumerate_grid(profile)? {
        let spec = cell.run_spec(profile)?;
        if args.in_process {
            println!("  [{}] {}", cell.index, spec.tag());
        } else {
            println!(
                "  [{}] {} {}",
                cell.index,
                args.client_program()?.display(),
                client_args(&spec, args.prometheus_url.as_deref()).join(" ")
            );
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.log_format);

    let profile = args.profile()?;
    if args.dry_run {
        print_plan(&profile, &args.results_root, &args)?;
        return Ok(ExitCode::SUCCESS);
    }

    let executor = args.executor()?;
    let aggregator = args.aggregator();
    let summary = run_sweep(
        &profile,
        &args.results_root,
        executor.as_ref(),
        aggregator.as_ref(),
        SweepOptions {
            show_progress: args.progress_modes().sweep,
        },
    )?;

    println!(
        "Sweep {} finished: {} succeeded, {} failed. Results in {}",
        summary.profile_name,
        summary.succeeded(),
        summary.failed(),
        summary.results_dir.display()
    );

    if summary.succeeded() == 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modes(flags: &[&str]) -> ProgressModes {
        let argv = std::iter::once("ttft_sweep").chain(flags.iter().copied());
        Args::try_parse_from(argv).unwrap().progress_modes()
    }

    #[test]
    fn sweep_and_run_bars_are_never_drawn_together() {
        let cases: [&[&str]; 5] = [
            &[],
            &["--in-process"],
            &["--in-process", "--run-progress"],
            &["--in-process", "--run-progress", "--no-progress"],
            &["--no-progress"],
        ];
        for flags in cases {
            let modes = modes(flags);
            assert!(!(modes.sweep && modes.run), "{flags:?}");
        }
    }

    #[test]
    fn in_process_sweep_shows_only_the_sweep_bar_by_default() {
        assert_eq!(
            modes(&["--in-process"]),
            ProgressModes {
                sweep: true,
                run: false
            }
        );
        assert_eq!(
            modes(&["--in-process", "--run-progress"]),
            ProgressModes {
                sweep: false,
                run: true
            }
        );
    }

    #[test]
    fn run_progress_requires_in_process() {
        assert!(Args::try_parse_from(["ttft_sweep", "--run-progress"]).is_err());
    }
}
