#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

use ttft_core::storage_keys::{artifact_path, ArtifactKind};
use ttft_core::{RequestBudget, RunSpec, SweepProfile};
use ttft_experiments::artifact::write_results_csv;
use ttft_experiments::metrics::{RequestRecord, RequestStatus};
use ttft_experiments::{ExecutionReport, FailureReason, RunExecutor, SweepClock};

/// Clock that only moves when slept on or advanced explicitly.
pub struct ManualClock {
    now: Cell<Instant>,
    pub sleeps: RefCell<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            now: Cell::new(Instant::now()),
            sleeps: RefCell::new(Vec::new()),
        })
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}

impl SweepClock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.advance(duration);
    }
}

/// Executor that writes a synthetic artifact for every cell except the ones
/// told to fail, which exit non-zero without leaving a file.
pub struct ScriptedExecutor {
    pub invocations: RefCell<Vec<String>>,
    pub started_at: RefCell<Vec<Instant>>,
    failing: Vec<String>,
    clock: Option<(Rc<ManualClock>, Duration)>,
}

impl ScriptedExecutor {
    pub fn new(failing: &[&str]) -> Self {
        Self {
            invocations: RefCell::new(Vec::new()),
            started_at: RefCell::new(Vec::new()),
            failing: failing.iter().map(|tag| tag.to_string()).collect(),
            clock: None,
        }
    }

    /// Each execution advances `clock` by `duration`.
    pub fn with_clock(mut self, clock: Rc<ManualClock>, duration: Duration) -> Self {
        self.clock = Some((clock, duration));
        self
    }
}

impl RunExecutor for ScriptedExecutor {
    fn execute(&self, spec: &RunSpec, results_dir: &Path) -> ExecutionReport {
        let tag = spec.tag().to_string();
        self.invocations.borrow_mut().push(tag.clone());
        if let Some((clock, duration)) = &self.clock {
            self.started_at.borrow_mut().push(clock.now());
            clock.advance(*duration);
        }

        if self.failing.contains(&tag) {
            return ExecutionReport::failure(FailureReason::NonZeroExit { code: Some(1) });
        }

        let path = artifact_path(results_dir, ArtifactKind::Results, spec.tag());
        let records = synthetic_records(spec);
        match write_results_csv(&path, &records) {
            Ok(()) => ExecutionReport::success(path),
            Err(error) => ExecutionReport::failure(FailureReason::ArtifactWrite {
                message: error.to_string(),
            }),
        }
    }
}

/// TTFT grows with concurrency so cells are distinguishable.
pub fn synthetic_records(spec: &RunSpec) -> Vec<RequestRecord> {
    let base_ttft = f64::from(spec.concurrency()) / 1_000.0;
    (0..spec.total_requests().min(20))
        .map(|i| {
            let start = i as f64 * 0.1;
            RequestRecord {
                id: format!("c0-r{i}"),
                client_id: 0,
                start_s: start,
                first_token_s: Some(start + base_ttft),
                end_s: start + base_ttft + 0.5,
                status: RequestStatus::Ok,
                error: None,
            }
        })
        .collect()
}

pub fn sweep_profile(
    name: &str,
    max_inflight: Vec<u32>,
    concurrency: Vec<u32>,
    cooldown_ms: u64,
) -> SweepProfile {
    SweepProfile {
        name: name.to_string(),
        max_inflight,
        concurrency,
        request_budget: RequestBudget::PerClient(10),
        prompt: "Hello world".to_string(),
        max_output_tokens: 64,
        cooldown_ms,
        run_timeout_secs: None,
    }
}
