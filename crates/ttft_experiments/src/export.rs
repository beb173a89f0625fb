//! Report export: summary CSV, full JSON report, Parquet and a console table.
//!
//! None of the outputs carry a generation timestamp, so exporting the same
//! report twice produces identical files.

use std::path::Path;

use ttft_core::storage_keys::{
    SUMMARY_CSV_FILE_NAME, SUMMARY_JSON_FILE_NAME, SUMMARY_PARQUET_FILE_NAME,
};

use crate::aggregate::SweepReport;

#[path = "export/csv.rs"]
mod csv;
#[path = "export/json.rs"]
mod json;
#[path = "export/parquet.rs"]
mod parquet;
#[path = "export/ranking.rs"]
mod ranking;
#[path = "export/table.rs"]
mod table;
#[path = "export/writer_utils.rs"]
mod writer_utils;

pub use ranking::RankedCell;

/// Export populated cells to CSV, one row per cell.
///
/// A report without populated cells still produces the header row.
///
/// # Errors
///
/// Returns an error if file creation or CSV writing fails.
pub fn export_summary_csv(
    report: &SweepReport,
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = writer_utils::create_output_file(path)?;
    csv::export_summary_csv_impl(report, file)
}

/// Export the full report, including "no data" cells and skipped files, to JSON.
///
/// # Errors
///
/// Returns an error if file creation or JSON serialization fails.
pub fn export_report_json(
    report: &SweepReport,
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = writer_utils::create_output_file(path)?;
    json::export_report_json_impl(report, file)
}

/// Export populated cells to Parquet.
///
/// # Errors
///
/// Returns an error if there are no populated cells, or if file creation or
/// Parquet writing fails.
pub fn export_summary_parquet(
    report: &SweepReport,
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let populated: Vec<_> = report.populated().collect();
    writer_utils::ensure_not_empty(&populated)?;
    let file = writer_utils::create_output_file(path)?;
    parquet::export_summary_parquet_impl(&populated, file)
}

/// Write every summary file into `results_dir`.
pub fn write_report_outputs(
    report: &SweepReport,
    results_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    export_summary_csv(report, results_dir.join(SUMMARY_CSV_FILE_NAME))?;
    export_report_json(report, results_dir.join(SUMMARY_JSON_FILE_NAME))?;
    if report.populated_count() > 0 {
        export_summary_parquet(report, results_dir.join(SUMMARY_PARQUET_FILE_NAME))?;
    } else {
        tracing::debug!("no populated cells, skipping parquet summary");
    }
    Ok(())
}

/// Populated cells ordered by trade-off score, best first.
pub fn rank_cells(report: &SweepReport) -> Vec<RankedCell> {
    ranking::rank_cells_impl(report)
}

/// Fixed-width comparison table of every cell.
pub fn render_table(report: &SweepReport) -> String {
    table::render_table_impl(report)
}
