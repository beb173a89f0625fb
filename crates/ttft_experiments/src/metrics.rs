//! Per-request observations and the latency statistics derived from them.
//!
//! A request counts as successful when a first token was observed, regardless
//! of how the stream ended afterwards.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Ok,
    Error,
}

/// One attempted request. Times are seconds since the run started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: String,
    pub client_id: u32,
    pub start_s: f64,
    pub first_token_s: Option<f64>,
    pub end_s: f64,
    pub status: RequestStatus,
    pub error: Option<String>,
}

impl RequestRecord {
    pub fn is_successful(&self) -> bool {
        self.first_token_s.is_some()
    }

    pub fn ttft_s(&self) -> Option<f64> {
        self.first_token_s.map(|first| first - self.start_s)
    }

    pub fn latency_s(&self) -> f64 {
        self.end_s - self.start_s
    }
}

/// Distribution summary of a latency sample, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    pub mean_s: f64,
    pub min_s: f64,
    pub max_s: f64,
    pub p50_s: f64,
    pub p95_s: f64,
    pub p99_s: f64,
}

impl LatencySummary {
    /// Summarize finite samples; `None` when there are none.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
        Some(Self {
            count: sorted.len(),
            mean_s: mean,
            min_s: sorted[0],
            max_s: sorted[sorted.len() - 1],
            p50_s: quantile(&sorted, 0.50),
            p95_s: quantile(&sorted, 0.95),
            p99_s: quantile(&sorted, 0.99),
        })
    }
}

/// Linear interpolation between closest ranks over a sorted, non-empty slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Aggregated metrics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub success_rate: f64,
    pub ttft: Option<LatencySummary>,
    pub latency: Option<LatencySummary>,
    /// Successful requests per second over the span of successful requests.
    pub throughput_rps: f64,
    pub duration_s: f64,
}

impl RunMetrics {
    pub fn from_records(records: &[RequestRecord]) -> Self {
        let successful: Vec<&RequestRecord> =
            records.iter().filter(|record| record.is_successful()).collect();

        let ttfts: Vec<f64> = successful.iter().filter_map(|record| record.ttft_s()).collect();
        let latencies: Vec<f64> = successful.iter().map(|record| record.latency_s()).collect();

        let duration_s = match (
            successful.iter().map(|record| record.start_s).reduce(f64::min),
            successful.iter().map(|record| record.end_s).reduce(f64::max),
        ) {
            (Some(first_start), Some(last_end)) => (last_end - first_start).max(0.0),
            _ => 0.0,
        };
        let throughput_rps = if duration_s > 0.0 {
            successful.len() as f64 / duration_s
        } else {
            0.0
        };
        let success_rate = if records.is_empty() {
            0.0
        } else {
            successful.len() as f64 / records.len() as f64
        };

        Self {
            total_requests: records.len(),
            successful_requests: successful.len(),
            failed_requests: records.len() - successful.len(),
            success_rate,
            ttft: LatencySummary::from_samples(&ttfts),
            latency: LatencySummary::from_samples(&latencies),
            throughput_rps,
            duration_s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start_s: f64, first_token_s: Option<f64>, end_s: f64) -> RequestRecord {
        RequestRecord {
            id: "c0-r0".to_string(),
            client_id: 0,
            start_s,
            first_token_s,
            end_s,
            status: if first_token_s.is_some() {
                RequestStatus::Ok
            } else {
                RequestStatus::Error
            },
            error: None,
        }
    }

    #[test]
    fn test_latency_summary() {
        let values: Vec<f64> = (1..=10).map(|v| v as f64 * 10.0).collect();
        let summary = LatencySummary::from_samples(&values).unwrap();

        assert_eq!(summary.count, 10);
        assert_eq!(summary.mean_s, 55.0);
        assert_eq!(summary.min_s, 10.0);
        assert_eq!(summary.max_s, 100.0);
        // Median of 10 values: halfway between 50 and 60.
        assert_eq!(summary.p50_s, 55.0);
        // Position 0.95 * 9 = 8.55, between 90 and 100.
        assert!((summary.p95_s - 95.5).abs() < 1e-9);
    }

    #[test]
    fn test_latency_summary_empty() {
        assert_eq!(LatencySummary::from_samples(&[]), None);
        assert_eq!(LatencySummary::from_samples(&[f64::NAN]), None);
    }

    #[test]
    fn test_single_sample_quantiles() {
        let summary = LatencySummary::from_samples(&[0.25]).unwrap();
        assert_eq!(summary.p50_s, 0.25);
        assert_eq!(summary.p99_s, 0.25);
    }

    #[test]
    fn test_run_metrics_ignore_requests_without_first_token() {
        let records = vec![
            record(0.0, Some(0.5), 2.0),
            record(1.0, Some(1.25), 3.0),
            record(0.0, None, 0.1),
        ];
        let metrics = RunMetrics::from_records(&records);

        assert_eq!(metrics.total_requests, 3);
        assert_eq!(metrics.successful_requests, 2);
        assert_eq!(metrics.failed_requests, 1);
        assert!((metrics.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.duration_s, 3.0);
        assert!((metrics.throughput_rps - 2.0 / 3.0).abs() < 1e-9);

        let ttft = metrics.ttft.unwrap();
        assert_eq!(ttft.min_s, 0.25);
        assert_eq!(ttft.max_s, 0.5);
    }

    #[test]
    fn test_run_metrics_all_failed() {
        let metrics = RunMetrics::from_records(&[record(0.0, None, 1.0)]);
        assert_eq!(metrics.successful_requests, 0);
        assert_eq!(metrics.ttft, None);
        assert_eq!(metrics.throughput_rps, 0.0);
    }
}
