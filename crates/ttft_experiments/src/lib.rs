//! Sweep execution and result aggregation for TTFT load tests.
//!
//! A sweep runs every (max-inflight, concurrency) cell of a profile once, in
//! grid order, with a cool-down between cells. Each run leaves a tagged
//! artifact in the profile's results directory, and the aggregator turns the
//! directory into a comparison report once the sweep is over.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use ttft_experiments::{
//!     full_profile, run_sweep, ArtifactAggregator, LoadgenExecutor, SweepOptions,
//! };
//! use ttft_experiments::{EndpointError, GenerateRequest, StreamingEndpoint};
//!
//! struct Echo;
//!
//! impl StreamingEndpoint for Echo {
//!     fn stream_generate(
//!         &self,
//!         _request: &GenerateRequest,
//!         on_chunk: &mut dyn FnMut(&[u8]),
//!     ) -> Result<(), EndpointError> {
//!         on_chunk(b"hello");
//!         Ok(())
//!     }
//!
//!     fn describe(&self) -> String {
//!         "echo".to_string()
//!     }
//! }
//!
//! let executor = LoadgenExecutor::new(Echo);
//! let summary = run_sweep(
//!     &full_profile(),
//!     Path::new("results"),
//!     &executor,
//!     &ArtifactAggregator::default(),
//!     SweepOptions::default(),
//! )
//! .unwrap();
//! println!("{} of {} cells succeeded", summary.succeeded(), summary.outcomes.len());
//! ```
//!
//! # Architecture
//!
//! - [`controller`]: sequential sweep over the grid with cool-down
//! - [`executor`]: the run executor seam and the in-process executor
//! - [`loadgen`]: concurrent clients against a streaming endpoint
//! - [`metrics`]: per-request records and latency statistics
//! - [`artifact`] and [`manifest`]: files written per run and per sweep
//! - [`aggregate`]: results directory to report
//! - [`tradeoff`]: scoring cells against each other
//! - [`export`]: CSV, JSON, Parquet and table output

pub mod aggregate;
pub mod artifact;
pub mod controller;
pub mod executor;
pub mod export;
pub mod gpu_log;
pub mod loadgen;
pub mod manifest;
pub mod metrics;
pub mod profiles;
mod progress;
pub mod tradeoff;

pub use aggregate::{
    aggregate_results_dir, AggregateError, ArtifactAggregator, CellData, NoDataReason,
    ResultAggregator, SweepReport,
};
pub use controller::{run_sweep, run_sweep_with_clock, SweepClock, SweepError, SweepOptions};
pub use executor::{
    ExecutionReport, FailureReason, LoadgenExecutor, RunExecutor, RunOutcome, RunStatus,
};
pub use loadgen::{EndpointError, GenerateRequest, StreamingEndpoint};
pub use profiles::{full_profile, profile_by_name, quick_profile};
pub use tradeoff::TradeoffWeights;
