use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use ttft_experiments::aggregate::{AggregateError, ArtifactAggregator, ResultAggregator};
use ttft_runtime::telemetry::{init_logging, LogFormat};

#[derive(Debug, Parser)]
#[command(about = "Summarize the run artifacts of one results directory")]
struct Args {
    results_dir: PathBuf,
    /// Print the table without writing summary files.
    #[arg(long)]
    no_write: bool,
    #[arg(long, value_enum, default_value_t)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_format);

    let aggregator = ArtifactAggregator {
        write_outputs: !args.no_write,
        ..ArtifactAggregator::default()
    };

    match aggregator.aggregate(&args.results_dir) {
        Ok(Some(report)) if report.cells.is_empty() => {
            eprintln!("no run artifacts in {}", args.results_dir.display());
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(error @ AggregateError::MissingDirectory(_)) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
        Err(error) => {
            tracing::error!(%error, "aggregation failed");
            ExitCode::FAILURE
        }
    }
}
