use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const MANIFEST_SCHEMA_VERSION: &str = "v1";
pub const METADATA_SCHEMA_VERSION: &str = "v1";
pub const MAX_DIMENSION_VALUES: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("profile name cannot be empty")]
    EmptyProfileName,
    #[error("profile name '{0}' must be a single path component")]
    InvalidProfileName(String),
    #[error("dimension '{0}' must be a non-empty list")]
    EmptyDimension(&'static str),
    #[error("dimension '{name}' exceeds MAX_DIMENSION_VALUES={max}")]
    DimensionTooLarge { name: &'static str, max: usize },
    #[error("dimension '{name}' lists {value} more than once")]
    DuplicateValue { name: &'static str, value: u32 },
    #[error("{0} must be a positive integer")]
    NotPositive(&'static str),
    #[error("prompt text cannot be empty")]
    EmptyPrompt,
    #[error("'{0}' is not a run tag of the form mi{{max_inflight}}_c{{concurrency}}")]
    InvalidRunTag(String),
    #[error("grid enumeration is inconsistent: {0}")]
    InconsistentGrid(String),
}

/// Deterministic label for one grid cell, rendered as `mi{M}_c{C}`.
///
/// Ordering is by max-inflight first, then concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunTag {
    max_inflight: u32,
    concurrency: u32,
}

impl RunTag {
    pub fn new(max_inflight: u32, concurrency: u32) -> Self {
        Self {
            max_inflight,
            concurrency,
        }
    }

    pub fn max_inflight(&self) -> u32 {
        self.max_inflight
    }

    pub fn concurrency(&self) -> u32 {
        self.concurrency
    }
}

impl fmt::Display for RunTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mi{}_c{}", self.max_inflight, self.concurrency)
    }
}

impl FromStr for RunTag {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidRunTag(value.to_string());
        let rest = value.strip_prefix("mi").ok_or_else(invalid)?;
        let (max_inflight, concurrency) = rest.split_once("_c").ok_or_else(invalid)?;
        let tag = Self::new(
            parse_digits(max_inflight).ok_or_else(invalid)?,
            parse_digits(concurrency).ok_or_else(invalid)?,
        );

        // Only the canonical rendering is accepted, so "mi0300_c5" is rejected.
        if tag.to_string() != value {
            return Err(invalid());
        }
        Ok(tag)
    }
}

impl TryFrom<String> for RunTag {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RunTag> for String {
    fn from(tag: RunTag) -> Self {
        tag.to_string()
    }
}

fn parse_digits(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// How many requests one cell issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "count", rename_all = "snake_case")]
pub enum RequestBudget {
    /// Every client issues this many sequential requests.
    PerClient(u32),
    /// Clients draw from a shared pool of this many requests.
    Total(u32),
}

impl RequestBudget {
    pub fn count(self) -> u32 {
        match self {
            Self::PerClient(count) | Self::Total(count) => count,
        }
    }

    pub fn total_requests(self, concurrency: u32) -> u64 {
        match self {
            Self::PerClient(count) => u64::from(count) * u64::from(concurrency),
            Self::Total(count) => u64::from(count),
        }
    }

    /// Number of client streams that can be kept busy for this budget.
    pub fn active_clients(self, concurrency: u32) -> u32 {
        match self {
            Self::PerClient(_) => concurrency,
            Self::Total(count) => concurrency.min(count),
        }
    }

    pub fn mode_name(self) -> &'static str {
        match self {
            Self::PerClient(_) => "per_client",
            Self::Total(_) => "total",
        }
    }
}

/// One sweep configuration: the two grid dimensions plus the fixed workload.
///
/// "full" and "quick" sweeps are two values of this record, not two code paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepProfile {
    pub name: String,
    pub max_inflight: Vec<u32>,
    pub concurrency: Vec<u32>,
    pub request_budget: RequestBudget,
    pub prompt: String,
    pub max_output_tokens: u32,
    pub cooldown_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_timeout_secs: Option<u64>,
}

impl SweepProfile {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn total_cells(&self) -> usize {
        self.max_inflight.len().saturating_mul(self.concurrency.len())
    }
}

/// Validate a profile and return it with its name trimmed.
pub fn normalize_profile(profile: SweepProfile) -> Result<SweepProfile, ConfigError> {
    let name = profile.name.trim().to_string();
    if name.is_empty() {
        return Err(ConfigError::EmptyProfileName);
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ConfigError::InvalidProfileName(name));
    }

    validate_dimension("max_inflight", &profile.max_inflight)?;
    validate_dimension("concurrency", &profile.concurrency)?;
    validate_workload(
        profile.request_budget,
        &profile.prompt,
        profile.max_output_tokens,
    )?;

    Ok(SweepProfile { name, ..profile })
}

fn validate_dimension(name: &'static str, values: &[u32]) -> Result<(), ConfigError> {
    if values.is_empty() {
        return Err(ConfigError::EmptyDimension(name));
    }
    if values.len() > MAX_DIMENSION_VALUES {
        return Err(ConfigError::DimensionTooLarge {
            name,
            max: MAX_DIMENSION_VALUES,
        });
    }

    let mut seen = HashSet::with_capacity(values.len());
    for &value in values {
        if value == 0 {
            return Err(ConfigError::NotPositive(name));
        }
        if !seen.insert(value) {
            return Err(ConfigError::DuplicateValue { name, value });
        }
    }
    Ok(())
}

fn validate_workload(
    request_budget: RequestBudget,
    prompt: &str,
    max_output_tokens: u32,
) -> Result<(), ConfigError> {
    if request_budget.count() == 0 {
        return Err(ConfigError::NotPositive("request_count"));
    }
    if max_output_tokens == 0 {
        return Err(ConfigError::NotPositive("max_output_tokens"));
    }
    if prompt.trim().is_empty() {
        return Err(ConfigError::EmptyPrompt);
    }
    Ok(())
}

/// A validated, fully specified run of one grid cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RunSpecFields")]
pub struct RunSpec {
    max_inflight: u32,
    concurrency: u32,
    request_budget: RequestBudget,
    prompt: String,
    max_output_tokens: u32,
    timeout_secs: Option<u64>,
}

impl RunSpec {
    pub fn new(
        max_inflight: u32,
        concurrency: u32,
        request_budget: RequestBudget,
        prompt: impl Into<String>,
        max_output_tokens: u32,
    ) -> Result<Self, ConfigError> {
        let prompt = prompt.into();
        if max_inflight == 0 {
            return Err(ConfigError::NotPositive("max_inflight"));
        }
        if concurrency == 0 {
            return Err(ConfigError::NotPositive("concurrency"));
        }
        validate_workload(request_budget, &prompt, max_output_tokens)?;

        Ok(Self {
            max_inflight,
            concurrency,
            request_budget,
            prompt,
            max_output_tokens,
            timeout_secs: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_secs = timeout.map(|value| value.as_secs().max(1));
        self
    }

    pub fn tag(&self) -> RunTag {
        RunTag::new(self.max_inflight, self.concurrency)
    }

    pub fn max_inflight(&self) -> u32 {
        self.max_inflight
    }

    pub fn concurrency(&self) -> u32 {
        self.concurrency
    }

    pub fn request_budget(&self) -> RequestBudget {
        self.request_budget
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn total_requests(&self) -> u64 {
        self.request_budget.total_requests(self.concurrency)
    }
}

/// Wire shape of [`RunSpec`]; deserialized values are validated like [`RunSpec::new`].
#[derive(Deserialize)]
struct RunSpecFields {
    max_inflight: u32,
    concurrency: u32,
    request_budget: RequestBudget,
    prompt: String,
    max_output_tokens: u32,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

impl TryFrom<RunSpecFields> for RunSpec {
    type Error = ConfigError;

    fn try_from(fields: RunSpecFields) -> Result<Self, Self::Error> {
        Ok(Self::new(
            fields.max_inflight,
            fields.concurrency,
            fields.request_budget,
            fields.prompt,
            fields.max_output_tokens,
        )?
        .with_timeout(fields.timeout_secs.map(Duration::from_secs)))
    }
}

pub fn stable_contract_json(value: impl Serialize) -> Result<String, serde_json::Error> {
    serde_json::to_string(&value)
}

/// SHA-256 over the canonical JSON of a profile.
pub fn profile_fingerprint(profile: &SweepProfile) -> Result<String, serde_json::Error> {
    let mut hasher = Sha256::new();
    hasher.update(stable_contract_json(profile)?);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> SweepProfile {
        SweepProfile {
            name: " quick ".to_string(),
            max_inflight: vec![300, 400],
            concurrency: vec![16, 32],
            request_budget: RequestBudget::PerClient(10),
            prompt: "Hello world".to_string(),
            max_output_tokens: 64,
            cooldown_ms: 1_000,
            run_timeout_secs: None,
        }
    }

    #[test]
    fn run_tag_renders_and_parses_canonical_form() {
        let tag = RunTag::new(350, 16);
        assert_eq!(tag.to_string(), "mi350_c16");
        assert_eq!("mi350_c16".parse::<RunTag>().unwrap(), tag);
    }

    #[test]
    fn run_tag_rejects_non_canonical_text() {
        for text in ["mi0350_c16", "mi350c16", "mi_c16", "mi+3_c16", "x350_c16", "mi350_c16_"] {
            assert!(text.parse::<RunTag>().is_err(), "{text} should be rejected");
        }
    }

    #[test]
    fn run_tag_is_injective_over_a_grid() {
        let mut seen = HashSet::new();
        for mi in [1, 11, 111, 300, 3000] {
            for c in [1, 11, 111, 300, 3000] {
                assert!(seen.insert(RunTag::new(mi, c).to_string()));
            }
        }
        assert_eq!(seen.len(), 25);
    }

    #[test]
    fn run_tag_serializes_as_string() {
        let json = serde_json::to_string(&RunTag::new(500, 400)).unwrap();
        assert_eq!(json, "\"mi500_c400\"");
        let back: RunTag = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RunTag::new(500, 400));
    }

    #[test]
    fn normalize_profile_trims_name() {
        let normalized = normalize_profile(profile()).expect("profile should pass");
        assert_eq!(normalized.name, "quick");
    }

    #[test]
    fn normalize_profile_rejects_bad_grids() {
        let mut empty = profile();
        empty.concurrency.clear();
        assert_eq!(
            normalize_profile(empty).unwrap_err(),
            ConfigError::EmptyDimension("concurrency")
        );

        let mut zero = profile();
        zero.max_inflight = vec![0, 300];
        assert_eq!(
            normalize_profile(zero).unwrap_err(),
            ConfigError::NotPositive("max_inflight")
        );

        let mut duplicate = profile();
        duplicate.concurrency = vec![16, 16];
        assert_eq!(
            normalize_profile(duplicate).unwrap_err(),
            ConfigError::DuplicateValue {
                name: "concurrency",
                value: 16
            }
        );

        let mut nested = profile();
        nested.name = "a/b".to_string();
        assert!(matches!(
            normalize_profile(nested).unwrap_err(),
            ConfigError::InvalidProfileName(_)
        ));
    }

    #[test]
    fn run_spec_validates_workload() {
        assert_eq!(
            RunSpec::new(300, 0, RequestBudget::PerClient(10), "hi", 64).unwrap_err(),
            ConfigError::NotPositive("concurrency")
        );
        assert_eq!(
            RunSpec::new(300, 4, RequestBudget::Total(0), "hi", 64).unwrap_err(),
            ConfigError::NotPositive("request_count")
        );
        assert_eq!(
            RunSpec::new(300, 4, RequestBudget::Total(3), "hi", 0).unwrap_err(),
            ConfigError::NotPositive("max_output_tokens")
        );
        assert_eq!(
            RunSpec::new(300, 4, RequestBudget::Total(3), "  ", 8).unwrap_err(),
            ConfigError::EmptyPrompt
        );
    }

    #[test]
    fn request_budget_totals() {
        assert_eq!(RequestBudget::PerClient(10).total_requests(300), 3_000);
        assert_eq!(RequestBudget::Total(10).total_requests(300), 10);
        assert_eq!(RequestBudget::Total(10).active_clients(300), 10);
        assert_eq!(RequestBudget::PerClient(1).active_clients(300), 300);
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let a = profile_fingerprint(&profile()).unwrap();
        let b = profile_fingerprint(&profile()).unwrap();
        assert_eq!(a, b);

        let mut changed = profile();
        changed.cooldown_ms += 1;
        assert_ne!(a, profile_fingerprint(&changed).unwrap());
    }

    #[test]
    fn deserialized_run_spec_is_validated() {
        let spec = RunSpec::new(300, 4, RequestBudget::Total(12), "Hello world", 64)
            .unwrap()
            .with_timeout(Some(Duration::from_secs(30)));
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(serde_json::from_str::<RunSpec>(&json).unwrap(), spec);

        let zero_concurrency = json.replace("\"concurrency\":4", "\"concurrency\":0");
        let error = serde_json::from_str::<RunSpec>(&zero_concurrency).unwrap_err();
        assert!(error.to_string().contains("concurrency must be a positive integer"));
    }
}
