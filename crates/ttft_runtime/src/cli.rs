//! Argument types shared by the binaries.

use clap::ValueEnum;
use ttft_core::RequestBudget;

/// Environment variables through which the sweep passes settings that fall
/// outside the positional measurement-client contract.
pub const ENV_RESULTS_DIR: &str = "TTFT_RESULTS_DIR";
pub const ENV_MAX_INFLIGHT: &str = "TTFT_MAX_INFLIGHT";
pub const ENV_REQUEST_BUDGET: &str = "TTFT_REQUEST_BUDGET";
pub const ENV_TARGET: &str = "LLM_TARGET";

pub const DEFAULT_TARGET: &str = "http://localhost:8000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BudgetMode {
    /// Every client issues the request count.
    #[default]
    PerClient,
    /// Clients share the request count.
    Total,
}

impl BudgetMode {
    pub fn budget(self, count: u32) -> RequestBudget {
        match self {
            Self::PerClient => RequestBudget::PerClient(count),
            Self::Total => RequestBudget::Total(count),
        }
    }

    pub fn of(budget: RequestBudget) -> Self {
        match budget {
            RequestBudget::PerClient(_) => Self::PerClient,
            RequestBudget::Total(_) => Self::Total,
        }
    }

    /// Spelling accepted on the command line and in the environment.
    pub fn as_arg(self) -> &'static str {
        match self {
            Self::PerClient => "per-client",
            Self::Total => "total",
        }
    }
}
