//! Trade-off scoring across populated grid cells.
//!
//! Each metric is min-max normalized over the cells being compared, then
//! combined with configurable weights. TTFT p95 is inverted so that lower
//! latency scores higher.

use crate::aggregate::CellSummary;

/// Weights for the trade-off score.
///
/// # Default Weights
///
/// - TTFT p95: 0.5 (inverted - lower is better)
/// - Throughput: 0.35
/// - Success rate: 0.15
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeoffWeights {
    pub ttft_p95_weight: f64,
    pub throughput_weight: f64,
    pub success_rate_weight: f64,
}

impl Default for TradeoffWeights {
    fn default() -> Self {
        Self {
            ttft_p95_weight: 0.5,
            throughput_weight: 0.35,
            success_rate_weight: 0.15,
        }
    }
}

/// Normalize a metric value to [0, 1]; 0.5 when every cell has the same value.
fn normalize_metric(value: f64, min: f64, max: f64) -> f64 {
    if max == min {
        0.5
    } else {
        ((value - min) / (max - min)).clamp(0.0, 1.0)
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
        (min.min(v), max.max(v))
    })
}

/// Scores in the same order as `cells`. Higher is better.
pub fn calculate_tradeoff_scores(cells: &[CellSummary], weights: &TradeoffWeights) -> Vec<f64> {
    if cells.is_empty() {
        return vec![];
    }

    let (ttft_min, ttft_max) = min_max(cells.iter().map(|c| c.ttft.p95_s));
    let (throughput_min, throughput_max) = min_max(cells.iter().map(|c| c.throughput_rps));
    let (success_min, success_max) = min_max(cells.iter().map(|c| c.success_rate));

    cells
        .iter()
        .map(|cell| {
            let ttft_score = 1.0 - normalize_metric(cell.ttft.p95_s, ttft_min, ttft_max);
            let throughput_score =
                normalize_metric(cell.throughput_rps, throughput_min, throughput_max);
            let success_score = normalize_metric(cell.success_rate, success_min, success_max);

            weights.ttft_p95_weight * ttft_score
                + weights.throughput_weight * throughput_score
                + weights.success_rate_weight * success_score
        })
        .collect()
}

/// Index of the highest score; the earliest cell wins ties.
pub fn best_index(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, &score) in scores.iter().enumerate() {
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}
