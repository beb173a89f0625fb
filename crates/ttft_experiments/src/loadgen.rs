//! In-process load generation against a streaming endpoint.
//!
//! A run keeps exactly `active_clients` request streams in flight: one rayon
//! worker per logical client, each issuing its requests back to back. TTFT is
//! the time from sending a request to receiving the first non-empty chunk.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use ttft_core::{RequestBudget, RunSpec};

use crate::metrics::{RequestRecord, RequestStatus};
use crate::progress::progress_bar;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Body of one generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub max_new_tokens: u32,
    pub temperature: f32,
    /// Deadline for the whole stream; enforced by the endpoint.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("endpoint returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("request exceeded its deadline of {0:?}")]
    Timeout(Duration),
}

/// A server that streams generated output for a prompt.
pub trait StreamingEndpoint: Send + Sync {
    /// Send one request and feed every received chunk to `on_chunk` as it arrives.
    fn stream_generate(
        &self,
        request: &GenerateRequest,
        on_chunk: &mut dyn FnMut(&[u8]),
    ) -> Result<(), EndpointError>;

    /// Human-readable target, recorded in run metadata.
    fn describe(&self) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to build client pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadPlan {
    pub concurrency: u32,
    pub budget: RequestBudget,
    pub request: GenerateRequest,
}

impl LoadPlan {
    pub fn from_spec(spec: &RunSpec) -> Self {
        Self {
            concurrency: spec.concurrency(),
            budget: spec.request_budget(),
            request: GenerateRequest {
                prompt: spec.prompt().to_string(),
                max_new_tokens: spec.max_output_tokens(),
                temperature: DEFAULT_TEMPERATURE,
                timeout: spec.timeout(),
            },
        }
    }

    pub fn active_clients(&self) -> u32 {
        self.budget.active_clients(self.concurrency)
    }

    pub fn total_requests(&self) -> u64 {
        self.budget.total_requests(self.concurrency)
    }
}

/// Hands out request slots according to the budget.
struct RequestDispenser {
    budget: RequestBudget,
    claimed: AtomicU64,
}

impl RequestDispenser {
    fn new(budget: RequestBudget) -> Self {
        Self {
            budget,
            claimed: AtomicU64::new(0),
        }
    }

    /// Whether the client that already issued `issued` requests may issue another.
    fn claim(&self, issued: u32) -> bool {
        match self.budget {
            RequestBudget::PerClient(count) => issued < count,
            RequestBudget::Total(count) => {
                self.claimed.fetch_add(1, Ordering::Relaxed) < u64::from(count)
            }
        }
    }
}

/// Records reserved up front; larger runs grow the buffer as requests complete.
const MAX_PREALLOCATED_RECORDS: u64 = 64 * 1024;

fn record_capacity(total_requests: u64) -> usize {
    total_requests.min(MAX_PREALLOCATED_RECORDS) as usize
}

/// Drive the plan against `endpoint` and return every attempted request, ordered by start time.
pub fn run_load(
    endpoint: &dyn StreamingEndpoint,
    plan: &LoadPlan,
    show_progress: bool,
) -> Result<Vec<RequestRecord>, LoadError> {
    let clients = plan.active_clients();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(clients as usize)
        .thread_name(|index| format!("ttft-client-{index}"))
        .build()?;

    let progress = progress_bar(plan.total_requests(), show_progress);
    let dispenser = RequestDispenser::new(plan.budget);
    let collected = Mutex::new(Vec::with_capacity(record_capacity(plan.total_requests())));
    let run_start = Instant::now();

    tracing::debug!(
        clients,
        total_requests = plan.total_requests(),
        target = %endpoint.describe(),
        "starting load"
    );

    pool.scope(|scope| {
        for client_id in 0..clients {
            let dispenser = &dispenser;
            let collected = &collected;
            let progress = progress.as_ref();
            scope.spawn(move |_| {
                let mut local = Vec::new();
                let mut issued = 0u32;
                while dispenser.claim(issued) {
                    local.push(issue_request(
                        endpoint,
                        &plan.request,
                        client_id,
                        issued,
                        run_start,
                    ));
                    issued += 1;
                    if let Some(bar) = progress {
                        bar.inc(1);
                    }
                }
                collected
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend(local);
            });
        }
    });

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    let mut records = collected.into_inner().unwrap_or_else(PoisonError::into_inner);
    records.sort_by(|a, b| a.start_s.total_cmp(&b.start_s).then_with(|| a.id.cmp(&b.id)));
    Ok(records)
}

fn issue_request(
    endpoint: &dyn StreamingEndpoint,
    request: &GenerateRequest,
    client_id: u32,
    sequence: u32,
    run_start: Instant,
) -> RequestRecord {
    let id = format!("c{client_id}-r{sequence}");
    let start_s = run_start.elapsed().as_secs_f64();
    let mut first_token_s = None;

    let outcome = endpoint.stream_generate(request, &mut |chunk| {
        if first_token_s.is_none() && !chunk.is_empty() {
            first_token_s = Some(run_start.elapsed().as_secs_f64());
        }
    });
    let end_s = run_start.elapsed().as_secs_f64();

    let (status, error) = match (outcome, first_token_s) {
        (Ok(()), Some(_)) => (RequestStatus::Ok, None),
        (Ok(()), None) => (
            RequestStatus::Error,
            Some("stream ended without output".to_string()),
        ),
        (Err(error), _) => {
            tracing::debug!(request_id = %id, error = %error, "request failed");
            (RequestStatus::Error, Some(error.to_string()))
        }
    };

    RequestRecord {
        id,
        client_id,
        start_s,
        first_token_s,
        end_s,
        status,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    struct FakeEndpoint {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
        fail_every: Option<usize>,
    }

    impl FakeEndpoint {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                fail_every: None,
            }
        }
    }

    impl StreamingEndpoint for FakeEndpoint {
        fn stream_generate(
            &self,
            _request: &GenerateRequest,
            on_chunk: &mut dyn FnMut(&[u8]),
        ) -> Result<(), EndpointError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            thread::sleep(self.delay);
            let result = match self.fail_every {
                Some(every) if call % every == 0 => Err(EndpointError::Connect("refused".into())),
                _ => {
                    on_chunk(b"");
                    on_chunk(b"hello");
                    on_chunk(b" world");
                    Ok(())
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn describe(&self) -> String {
            "fake".to_string()
        }
    }

    fn plan(concurrency: u32, budget: RequestBudget) -> LoadPlan {
        let spec = RunSpec::new(300, concurrency, budget, "Hello world", 16).unwrap();
        LoadPlan::from_spec(&spec)
    }

    #[test]
    fn per_client_budget_sustains_concurrency() {
        let endpoint = FakeEndpoint::new(Duration::from_millis(25));
        let records = run_load(&endpoint, &plan(4, RequestBudget::PerClient(3)), false).unwrap();

        assert_eq!(records.len(), 12);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 12);
        assert_eq!(endpoint.max_in_flight.load(Ordering::SeqCst), 4);
        for client in 0..4 {
            assert_eq!(records.iter().filter(|r| r.client_id == client).count(), 3);
        }
    }

    #[test]
    fn total_budget_issues_exactly_n_requests() {
        let endpoint = FakeEndpoint::new(Duration::from_millis(1));
        let records = run_load(&endpoint, &plan(4, RequestBudget::Total(10)), false).unwrap();

        assert_eq!(records.len(), 10);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 10);
        assert!(endpoint.max_in_flight.load(Ordering::SeqCst) <= 4);
    }

    #[test]
    fn total_budget_smaller_than_concurrency_uses_fewer_clients() {
        let endpoint = FakeEndpoint::new(Duration::from_millis(1));
        let plan = plan(8, RequestBudget::Total(3));
        assert_eq!(plan.active_clients(), 3);

        let records = run_load(&endpoint, &plan, false).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn first_token_ignores_empty_chunks_and_failures_are_recorded() {
        let mut endpoint = FakeEndpoint::new(Duration::from_millis(1));
        endpoint.fail_every = Some(2);
        let records = run_load(&endpoint, &plan(1, RequestBudget::PerClient(4)), false).unwrap();

        assert_eq!(records.len(), 4);
        let failed: Vec<_> = records.iter().filter(|r| !r.is_successful()).collect();
        assert_eq!(failed.len(), 2);
        for record in &failed {
            assert_eq!(record.status, RequestStatus::Error);
            assert!(record.error.as_deref().unwrap().contains("refused"));
        }
        for record in records.iter().filter(|r| r.is_successful()) {
            let first = record.first_token_s.unwrap();
            assert!(first >= record.start_s && first <= record.end_s);
        }
    }

    #[test]
    fn records_are_ordered_by_start() {
        let endpoint = FakeEndpoint::new(Duration::from_millis(2));
        let records = run_load(&endpoint, &plan(3, RequestBudget::PerClient(2)), false).unwrap();
        assert!(records.windows(2).all(|pair| pair[0].start_s <= pair[1].start_s));
    }

    #[test]
    fn record_buffer_is_not_sized_by_huge_budgets() {
        let huge = plan(500, RequestBudget::PerClient(4_000_000));
        assert_eq!(huge.total_requests(), 2_000_000_000);
        assert_eq!(
            record_capacity(huge.total_requests()),
            MAX_PREALLOCATED_RECORDS as usize
        );
        assert_eq!(record_capacity(12), 12);
    }
}
