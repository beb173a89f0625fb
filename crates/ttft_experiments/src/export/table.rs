use std::fmt::Write;

use crate::aggregate::{CellData, GridSource, SweepReport};

const WIDTH: usize = 86;

pub(crate) fn render_table_impl(report: &SweepReport) -> String {
    let mut out = String::new();
    let rule = "=".repeat(WIDTH);
    let thin = "-".repeat(WIDTH);

    let title = match &report.profile_name {
        Some(name) => format!("TTFT Sweep Summary ({name})"),
        None => "TTFT Sweep Summary".to_string(),
    };
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{:^width$}", title, width = WIDTH);
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "{:<16} {:>10} {:>10} {:>10} {:>12} {:>8} {:>7} {:>7}",
        "Run tag", "TTFT p50", "TTFT p95", "TTFT p99", "Throughput", "Success", "GPU %", "Score"
    );
    let _ = writeln!(out, "{thin}");

    for cell in &report.cells {
        let tag = if cell.in_expected_grid {
            cell.run_tag.to_string()
        } else {
            format!("{}*", cell.run_tag)
        };
        match &cell.data {
            CellData::Populated { summary } => {
                let gpu = summary
                    .gpu
                    .map(|gpu| format!("{:.1}", gpu.sm_util_pct))
                    .unwrap_or_else(|| "N/A".to_string());
                let score = cell
                    .tradeoff_score
                    .map(|score| format!("{score:.3}"))
                    .unwrap_or_else(|| "-".to_string());
                let _ = writeln!(
                    out,
                    "{:<16} {:>9.3}s {:>9.3}s {:>9.3}s {:>8.2} r/s {:>7.1}% {:>7} {:>7}",
                    tag,
                    summary.ttft.p50_s,
                    summary.ttft.p95_s,
                    summary.ttft.p99_s,
                    summary.throughput_rps,
                    summary.success_rate * 100.0,
                    gpu,
                    score
                );
            }
            CellData::NoData { reason } => {
                let _ = writeln!(out, "{tag:<16} no data ({reason})");
            }
        }
    }

    let _ = writeln!(out, "{thin}");
    let source = match report.grid_source {
        GridSource::Manifest => "sweep manifest",
        GridSource::Inferred => "artifact names",
    };
    let _ = writeln!(
        out,
        "{} populated, {} no data; grid from {source}",
        report.populated().count(),
        report.cells.len() - report.populated().count()
    );
    if report.cells.iter().any(|cell| !cell.in_expected_grid) {
        let _ = writeln!(out, "* artifact outside the expected grid");
    }
    if let Some(best) = report.best_cell {
        let _ = writeln!(out, "Best trade-off: {best}");
    }
    for skipped in &report.skipped {
        let _ = writeln!(out, "Skipped {}: {}", skipped.file, skipped.reason);
    }
    let _ = writeln!(out, "{rule}");
    out
}
