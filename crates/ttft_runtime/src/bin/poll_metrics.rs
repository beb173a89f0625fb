//! Prints the watched serving metrics on a fixed interval until interrupted.

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use ttft_runtime::adapters::prometheus::{PrometheusClient, PrometheusError, WATCHED_SERIES};
use ttft_runtime::telemetry::{init_logging, LogFormat};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// `sum(series)` through the Prometheus query API.
    Query,
    /// Parse a raw `/metrics` page.
    Exposition,
}

#[derive(Debug, Parser)]
#[command(about = "Poll LLM serving metrics")]
struct Args {
    /// Prometheus base URL, or the full `/metrics` URL in exposition mode.
    #[arg(long, env = "PROMETHEUS_URL", default_value = "http://localhost:9090")]
    url: String,
    #[arg(long, value_enum, default_value = "query")]
    mode: Mode,
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,
    /// Stop after this many polls.
    #[arg(long)]
    iterations: Option<u64>,
    #[arg(long, value_enum, default_value_t)]
    log_format: LogFormat,
}

fn poll(client: &PrometheusClient, mode: Mode) -> Result<BTreeMap<String, Option<f64>>, PrometheusError> {
    match mode {
        Mode::Exposition => client.scrape(&WATCHED_SERIES),
        Mode::Query => WATCHED_SERIES
            .iter()
            .map(|name| {
                client
                    .query_scalar(&format!("sum({name})"))
                    .map(|value| (name.to_string(), value))
            })
            .collect(),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_format);

    let client = PrometheusClient::new(&args.url, REQUEST_TIMEOUT)
        .context("cannot build Prometheus client")?;
    let interval = Duration::from_secs(args.interval_secs.max(1));

    let mut polls = 0;
    loop {
        match poll(&client, args.mode) {
            Ok(values) => {
                println!("--- {}", args.url);
                for (name, value) in values {
                    match value {
                        Some(value) => println!("{name}: {value}"),
                        None => println!("{name}: (no data)"),
                    }
                }
            }
            Err(error) => tracing::warn!(%error, "poll failed"),
        }

        polls += 1;
        if args.iterations.is_some_and(|limit| polls >= limit) {
            return Ok(());
        }
        thread::sleep(interval);
    }
}
