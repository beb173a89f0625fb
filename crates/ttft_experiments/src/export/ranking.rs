use serde::Serialize;
use ttft_core::RunTag;

use crate::aggregate::SweepReport;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCell {
    pub rank: usize,
    pub run_tag: RunTag,
    pub score: f64,
    pub p95_ttft_s: f64,
    pub throughput_rps: f64,
}

pub(crate) fn rank_cells_impl(report: &SweepReport) -> Vec<RankedCell> {
    let mut scored: Vec<(usize, RankedCell)> = report
        .populated()
        .enumerate()
        .filter_map(|(position, (cell, summary))| {
            let score = cell.tradeoff_score?;
            Some((
                position,
                RankedCell {
                    rank: 0,
                    run_tag: cell.run_tag,
                    score,
                    p95_ttft_s: summary.ttft.p95_s,
                    throughput_rps: summary.throughput_rps,
                },
            ))
        })
        .collect();

    // Stable on grid position so equal scores keep sweep order.
    scored.sort_by(|(pos_a, a), (pos_b, b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(pos_a.cmp(pos_b))
    });

    scored
        .into_iter()
        .enumerate()
        .map(|(index, (_, mut ranked))| {
            ranked.rank = index + 1;
            ranked
        })
        .collect()
}
