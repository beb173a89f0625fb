//! Shared sweep domain primitives for the TTFT load-testing harness.
//!
//! This crate owns the deterministic parts of a sweep: profile validation,
//! run tags, grid enumeration and artifact naming. It intentionally excludes
//! process spawning, networking and file I/O; those live in
//! `ttft_experiments` and `ttft_runtime`.

pub mod contract;
pub mod grid;
pub mod storage_keys;

pub use contract::{ConfigError, RequestBudget, RunSpec, RunTag, SweepProfile};
pub use grid::{enumerate_grid, GridCell};
