//! Measurement client: drives one run against a streaming endpoint and writes
//! its artifacts.
//!
//! Positional contract:
//! `measure_ttft <concurrency> <requests> [prompt] [max_tokens] [run_tag] [prometheus_url]`

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use ttft_core::{RunSpec, RunTag};
use ttft_experiments::executor::{measure_run, QueueDepthProbe};
use ttft_experiments::metrics::{LatencySummary, RunMetrics};
use ttft_experiments::profiles::{DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_PROMPT};
use ttft_runtime::adapters::gpu_monitor::GpuMonitor;
use ttft_runtime::adapters::http_stream::{HttpStreamEndpoint, DEFAULT_REQUEST_TIMEOUT};
use ttft_runtime::adapters::prometheus::PrometheusClient;
use ttft_runtime::cli::{
    BudgetMode, DEFAULT_TARGET, ENV_MAX_INFLIGHT, ENV_REQUEST_BUDGET, ENV_RESULTS_DIR, ENV_TARGET,
};
use ttft_runtime::telemetry::{init_logging, LogFormat};

const PROMETHEUS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(about = "Measure time-to-first-token under concurrent streaming load")]
struct Args {
    /// Concurrent client streams.
    concurrency: u32,
    /// Requests per client, or in total with `--budget total`.
    request_count: u32,
    #[arg(default_value = DEFAULT_PROMPT)]
    prompt: String,
    #[arg(default_value_t = DEFAULT_MAX_OUTPUT_TOKENS)]
    max_tokens: u32,
    /// Run tag `mi{max_inflight}_c{concurrency}` naming the artifacts.
    run_tag: Option<String>,
    /// Prometheus base URL for queue-depth snapshots.
    prometheus_url: Option<String>,

    #[arg(long, env = ENV_TARGET, default_value = DEFAULT_TARGET)]
    target: String,
    /// Server max-inflight setting; taken from the run tag when omitted.
    #[arg(long, env = ENV_MAX_INFLIGHT)]
    max_inflight: Option<u32>,
    #[arg(long, env = ENV_REQUEST_BUDGET, value_enum, default_value_t)]
    budget: BudgetMode,
    #[arg(long, env = ENV_RESULTS_DIR, default_value = "results")]
    results_dir: PathBuf,
    /// Per-request deadline in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long)]
    no_gpu_monitor: bool,
    #[arg(long)]
    no_progress: bool,
    #[arg(long, value_enum, default_value_t)]
    log_format: LogFormat,
}

impl Args {
    fn run_spec(&self) -> anyhow::Result<RunSpec> {
        let tag = self
            .run_tag
            .as_deref()
            .map(str::parse::<RunTag>)
            .transpose()?;

        if let Some(tag) = tag {
            if tag.concurrency() != self.concurrency {
                bail!(
                    "run tag {tag} does not match concurrency {}",
                    self.concurrency
                );
            }
            if let Some(max_inflight) = self.max_inflight {
                if max_inflight != tag.max_inflight() {
                    bail!("run tag {tag} does not match max-inflight {max_inflight}");
                }
            }
        }

        let max_inflight = match (self.max_inflight, tag) {
            (Some(value), _) => value,
            (None, Some(tag)) => tag.max_inflight(),
            (None, None) => bail!("either a run tag or --max-inflight is required"),
        };

        let spec = RunSpec::new(
            max_inflight,
            self.concurrency,
            self.budget.budget(self.request_count),
            self.prompt.as_str(),
            self.max_tokens,
        )?;
        Ok(spec.with_timeout(self.timeout_secs.map(Duration::from_secs)))
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.log_format);

    let spec = args.run_spec()?;
    std::fs::create_dir_all(&args.results_dir)
        .with_context(|| format!("cannot create {}", args.results_dir.display()))?;

    let endpoint = HttpStreamEndpoint::new(&args.target, DEFAULT_REQUEST_TIMEOUT)
        .context("cannot build HTTP client")?;
    let prometheus = args
        .prometheus_url
        .as_deref()
        .map(|url| PrometheusClient::new(url, PROMETHEUS_TIMEOUT))
        .transpose()
        .context("cannot build Prometheus client")?;

    println!("Target:       {}", endpoint.stream_url());
    println!("Run tag:      {}", spec.tag());
    println!(
        "Load:         {} clients, {} requests ({})",
        spec.concurrency(),
        spec.total_requests(),
        spec.request_budget().mode_name()
    );
    println!("Max tokens:   {}", spec.max_output_tokens());

    let gpu = if args.no_gpu_monitor {
        None
    } else {
        GpuMonitor::start(&args.results_dir, spec.tag())
    };

    let measured = measure_run(
        &endpoint,
        &spec,
        &args.results_dir,
        prometheus.as_ref().map(|client| client as &dyn QueueDepthProbe),
        !args.no_progress,
    );
    if let Some(gpu) = gpu {
        gpu.stop();
    }
    let artifacts = measured.context("measurement failed")?;

    print_summary(&artifacts.metrics);
    println!("Results:      {}", artifacts.results_csv.display());
    println!("Metadata:     {}", artifacts.metadata_json.display());

    if artifacts.metrics.successful_requests == 0 {
        tracing::error!(run_tag = %spec.tag(), "every request failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(metrics: &RunMetrics) {
    println!();
    println!("Requests:     {} total", metrics.total_requests);
    println!("Successful:   {}", metrics.successful_requests);
    println!("Failed:       {}", metrics.failed_requests);
    println!("Success rate: {:.1}%", metrics.success_rate * 100.0);
    print_latency("TTFT", metrics.ttft.as_ref());
    print_latency("Latency", metrics.latency.as_ref());
    println!("Throughput:   {:.2} req/s", metrics.throughput_rps);
}

fn print_latency(label: &str, summary: Option<&LatencySummary>) {
    let Some(summary) = summary else {
        println!("{label}: no successful requests");
        return;
    };
    println!("{label} (s):");
    println!(
        "  p50 {:.3}  p95 {:.3}  p99 {:.3}",
        summary.p50_s, summary.p95_s, summary.p99_s
    );
    println!(
        "  mean {:.3}  min {:.3}  max {:.3}",
        summary.mean_s, summary.min_s, summary.max_s
    );
}
