//! Built-in sweep profiles.
//!
//! `full` and `quick` differ only in their values; both run through the same
//! controller.

use ttft_core::{RequestBudget, SweepProfile};

pub const DEFAULT_PROMPT: &str = "Hello world";
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 64;

/// 3x3 grid over max-inflight and concurrency with a one minute cool-down.
pub fn full_profile() -> SweepProfile {
    SweepProfile {
        name: "full".to_string(),
        max_inflight: vec![300, 400, 500],
        concurrency: vec![300, 400, 500],
        request_budget: RequestBudget::PerClient(10),
        prompt: DEFAULT_PROMPT.to_string(),
        max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        cooldown_ms: 60_000,
        run_timeout_secs: Some(1_800),
    }
}

/// Small grid for smoke-testing a deployment.
pub fn quick_profile() -> SweepProfile {
    SweepProfile {
        name: "quick".to_string(),
        max_inflight: vec![300, 500],
        concurrency: vec![16, 64],
        request_budget: RequestBudget::PerClient(3),
        prompt: DEFAULT_PROMPT.to_string(),
        max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        cooldown_ms: 10_000,
        run_timeout_secs: Some(600),
    }
}

pub fn profile_by_name(name: &str) -> Option<SweepProfile> {
    match name {
        "full" => Some(full_profile()),
        "quick" => Some(quick_profile()),
        _ => None,
    }
}

pub fn profile_names() -> &'static [&'static str] {
    &["full", "quick"]
}
