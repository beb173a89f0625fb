//! Process and network adapters for TTFT sweeps, plus the command-line entry points.
//!
//! Library crates stay free of subprocesses and HTTP; everything that touches
//! the outside world (the measurement client process, the inference endpoint,
//! Prometheus, `nvidia-smi`) is implemented here behind the traits defined in
//! `ttft_experiments`.

pub mod adapters;
pub mod cli;
pub mod telemetry;
