//! Result aggregation over a sweep's results directory.
//!
//! The report is a pure function of the directory contents: files are read
//! in sorted order and nothing time-dependent is recorded, so aggregating an
//! unchanged directory twice yields identical output.
//!
//! Every expected cell appears in the report. Cells without a usable artifact
//! are "no data" entries carrying the reason; unusable files are listed in
//! `skipped` and never abort the scan.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use ttft_core::storage_keys::{artifact_path, parse_artifact_file_name, ArtifactKind};
use ttft_core::RunTag;

use crate::artifact::read_results_csv;
use crate::export;
use crate::gpu_log::{read_gpu_utilization, GpuUtilization};
use crate::manifest::read_manifest;
use crate::metrics::{LatencySummary, RunMetrics};
use crate::tradeoff::{best_index, calculate_tradeoff_scores, TradeoffWeights};

/// Statistics of one populated cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSummary {
    pub run_tag: RunTag,
    pub file: String,
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub success_rate: f64,
    pub ttft: LatencySummary,
    pub latency: LatencySummary,
    pub throughput_rps: f64,
    pub duration_s: f64,
    pub gpu: Option<GpuUtilization>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum NoDataReason {
    MissingArtifact,
    NoSuccessfulRequests,
    Corrupt(String),
}

impl std::fmt::Display for NoDataReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingArtifact => write!(f, "missing artifact"),
            Self::NoSuccessfulRequests => write!(f, "no successful requests"),
            Self::Corrupt(_) => write!(f, "corrupt artifact"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CellData {
    Populated { summary: CellSummary },
    NoData { reason: NoDataReason },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellReport {
    pub run_tag: RunTag,
    pub max_inflight: u32,
    pub concurrency: u32,
    /// False for artifacts found outside the expected grid.
    pub in_expected_grid: bool,
    pub data: CellData,
    pub tradeoff_score: Option<f64>,
}

impl CellReport {
    pub fn summary(&self) -> Option<&CellSummary> {
        match &self.data {
            CellData::Populated { summary } => Some(summary),
            CellData::NoData { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedArtifact {
    pub file: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridSource {
    Manifest,
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub profile_name: Option<String>,
    pub grid_source: GridSource,
    pub cells: Vec<CellReport>,
    pub skipped: Vec<SkippedArtifact>,
    pub best_cell: Option<RunTag>,
}

impl SweepReport {
    pub fn populated(&self) -> impl Iterator<Item = (&CellReport, &CellSummary)> {
        self.cells
            .iter()
            .filter_map(|cell| cell.summary().map(|summary| (cell, summary)))
    }

    pub fn populated_count(&self) -> usize {
        self.populated().count()
    }

    pub fn no_data_count(&self) -> usize {
        self.cells.len() - self.populated_count()
    }

    pub fn cell(&self, tag: RunTag) -> Option<&CellReport> {
        self.cells.iter().find(|cell| cell.run_tag == tag)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("results directory {0} does not exist")]
    MissingDirectory(PathBuf),
    #[error("cannot list {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write report outputs: {0}")]
    Export(String),
    #[error("aggregator process failed: {0}")]
    Process(String),
}

/// Consumes a results directory after the sweep has finished.
pub trait ResultAggregator {
    /// `Ok(None)` when the report is produced out of process.
    fn aggregate(&self, results_dir: &Path) -> Result<Option<SweepReport>, AggregateError>;
}

/// In-process aggregator that optionally writes summary files and prints a table.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactAggregator {
    pub weights: TradeoffWeights,
    pub write_outputs: bool,
    pub print_table: bool,
}

impl Default for ArtifactAggregator {
    fn default() -> Self {
        Self {
            weights: TradeoffWeights::default(),
            write_outputs: true,
            print_table: true,
        }
    }
}

impl ResultAggregator for ArtifactAggregator {
    fn aggregate(&self, results_dir: &Path) -> Result<Option<SweepReport>, AggregateError> {
        let report = aggregate_results_dir_with_weights(results_dir, &self.weights)?;

        if self.write_outputs {
            export::write_report_outputs(&report, results_dir)
                .map_err(|error| AggregateError::Export(error.to_string()))?;
        }
        if self.print_table {
            print!("{}", export::render_table(&report));
        }

        tracing::info!(
            populated = report.populated_count(),
            no_data = report.no_data_count(),
            skipped = report.skipped.len(),
            "aggregated results"
        );
        Ok(Some(report))
    }
}

pub fn aggregate_results_dir(results_dir: &Path) -> Result<SweepReport, AggregateError> {
    aggregate_results_dir_with_weights(results_dir, &TradeoffWeights::default())
}

pub fn aggregate_results_dir_with_weights(
    results_dir: &Path,
    weights: &TradeoffWeights,
) -> Result<SweepReport, AggregateError> {
    if !results_dir.is_dir() {
        return Err(AggregateError::MissingDirectory(results_dir.to_path_buf()));
    }

    let mut skipped = Vec::new();
    let mut candidates = Vec::new();
    for file in list_result_files(results_dir)? {
        match parse_artifact_file_name(ArtifactKind::Results, &file) {
            Some(tag) => candidates.push((tag, file)),
            None => skipped.push(SkippedArtifact {
                reason: "file name does not follow results_mi{M}_c{C}.csv".to_string(),
                file,
            }),
        }
    }

    let parsed: Vec<(RunTag, String, CellData)> = candidates
        .into_par_iter()
        .map(|(tag, file)| {
            let data = load_cell(results_dir, tag, &file);
            (tag, file, data)
        })
        .collect();

    let mut observed = BTreeMap::new();
    for (tag, file, data) in parsed {
        if let CellData::NoData {
            reason: NoDataReason::Corrupt(detail),
        } = &data
        {
            tracing::warn!(file = %file, error = %detail, "skipping corrupt artifact");
            skipped.push(SkippedArtifact {
                file: file.clone(),
                reason: detail.clone(),
            });
        }
        observed.insert(tag, data);
    }

    let (grid_source, profile_name, expected) = expected_grid(results_dir, &observed, &mut skipped);

    let mut cells: Vec<CellReport> = Vec::with_capacity(expected.len());
    for &tag in &expected {
        let data = observed.remove(&tag).unwrap_or(CellData::NoData {
            reason: NoDataReason::MissingArtifact,
        });
        cells.push(cell_report(tag, true, data));
    }
    cells.extend(
        observed
            .into_iter()
            .map(|(tag, data)| cell_report(tag, false, data)),
    );

    let best_cell = apply_tradeoff_scores(&mut cells, weights);
    skipped.sort_by(|a, b| a.file.cmp(&b.file));

    Ok(SweepReport {
        profile_name,
        grid_source,
        cells,
        skipped,
        best_cell,
    })
}

fn list_result_files(results_dir: &Path) -> Result<Vec<String>, AggregateError> {
    let read_dir_error = |source| AggregateError::ReadDir {
        path: results_dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(results_dir).map_err(read_dir_error)? {
        let entry = entry.map_err(read_dir_error)?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if ArtifactKind::Results.matches(&name) && entry.path().is_file() {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

fn load_cell(results_dir: &Path, tag: RunTag, file: &str) -> CellData {
    let records = match read_results_csv(&results_dir.join(file)) {
        Ok(records) => records,
        Err(error) => {
            return CellData::NoData {
                reason: NoDataReason::Corrupt(error.to_string()),
            }
        }
    };

    let metrics = RunMetrics::from_records(&records);
    let (Some(ttft), Some(latency)) = (metrics.ttft, metrics.latency) else {
        return CellData::NoData {
            reason: NoDataReason::NoSuccessfulRequests,
        };
    };

    let gpu = read_gpu_utilization(&artifact_path(results_dir, ArtifactKind::GpuMetrics, tag));
    CellData::Populated {
        summary: CellSummary {
            run_tag: tag,
            file: file.to_string(),
            total_requests: metrics.total_requests,
            successful_requests: metrics.successful_requests,
            failed_requests: metrics.failed_requests,
            success_rate: metrics.success_rate,
            ttft,
            latency,
            throughput_rps: metrics.throughput_rps,
            duration_s: metrics.duration_s,
            gpu,
        },
    }
}

/// Expected tags from the manifest, or the sorted cross product of observed values.
fn expected_grid(
    results_dir: &Path,
    observed: &BTreeMap<RunTag, CellData>,
    skipped: &mut Vec<SkippedArtifact>,
) -> (GridSource, Option<String>, Vec<RunTag>) {
    match read_manifest(results_dir) {
        Ok(Some(manifest)) => {
            return (
                GridSource::Manifest,
                Some(manifest.profile.name),
                manifest.cells,
            )
        }
        Ok(None) => {}
        Err(error) => {
            tracing::warn!(error = %error, "ignoring unreadable sweep manifest");
            skipped.push(SkippedArtifact {
                file: ttft_core::storage_keys::MANIFEST_FILE_NAME.to_string(),
                reason: error.to_string(),
            });
        }
    }

    let max_inflight: BTreeSet<u32> = observed.keys().map(RunTag::max_inflight).collect();
    let concurrency: BTreeSet<u32> = observed.keys().map(RunTag::concurrency).collect();
    let tags = max_inflight
        .iter()
        .flat_map(|&mi| concurrency.iter().map(move |&c| RunTag::new(mi, c)))
        .collect();
    (GridSource::Inferred, None, tags)
}

fn cell_report(tag: RunTag, in_expected_grid: bool, data: CellData) -> CellReport {
    CellReport {
        run_tag: tag,
        max_inflight: tag.max_inflight(),
        concurrency: tag.concurrency(),
        in_expected_grid,
        data,
        tradeoff_score: None,
    }
}

fn apply_tradeoff_scores(cells: &mut [CellReport], weights: &TradeoffWeights) -> Option<RunTag> {
    let populated: Vec<(usize, CellSummary)> = cells
        .iter()
        .enumerate()
        .filter_map(|(index, cell)| cell.summary().map(|summary| (index, summary.clone())))
        .collect();
    let summaries: Vec<CellSummary> = populated.iter().map(|(_, s)| s.clone()).collect();
    let scores = calculate_tradeoff_scores(&summaries, weights);

    for ((index, _), score) in populated.iter().zip(&scores) {
        cells[*index].tradeoff_score = Some(*score);
    }
    best_index(&scores).map(|best| cells[populated[best].0].run_tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::write_results_csv;
    use crate::metrics::{RequestRecord, RequestStatus};
    use tempfile::TempDir;

    fn write_cell(dir: &Path, tag: RunTag, ttfts: &[Option<f64>]) {
        let records: Vec<RequestRecord> = ttfts
            .iter()
            .enumerate()
            .map(|(i, ttft)| RequestRecord {
                id: format!("c0-r{i}"),
                client_id: 0,
                start_s: i as f64,
                first_token_s: ttft.map(|t| i as f64 + t),
                end_s: i as f64 + 1.0,
                status: if ttft.is_some() {
                    RequestStatus::Ok
                } else {
                    RequestStatus::Error
                },
                error: None,
            })
            .collect();
        write_results_csv(&artifact_path(dir, ArtifactKind::Results, tag), &records).unwrap();
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            aggregate_results_dir(&dir.path().join("nope")),
            Err(AggregateError::MissingDirectory(_))
        ));
    }

    #[test]
    fn inferred_grid_fills_holes_with_no_data() {
        let dir = TempDir::new().unwrap();
        write_cell(dir.path(), RunTag::new(300, 1), &[Some(0.1), Some(0.2)]);
        write_cell(dir.path(), RunTag::new(400, 2), &[Some(0.3)]);

        let report = aggregate_results_dir(dir.path()).unwrap();
        assert_eq!(report.grid_source, GridSource::Inferred);
        let tags: Vec<String> = report.cells.iter().map(|c| c.run_tag.to_string()).collect();
        assert_eq!(tags, vec!["mi300_c1", "mi300_c2", "mi400_c1", "mi400_c2"]);
        assert_eq!(report.populated_count(), 2);
        assert_eq!(
            report.cell(RunTag::new(300, 2)).unwrap().data,
            CellData::NoData {
                reason: NoDataReason::MissingArtifact
            }
        );
    }

    #[test]
    fn all_failed_artifact_is_no_data() {
        let dir = TempDir::new().unwrap();
        write_cell(dir.path(), RunTag::new(300, 1), &[None, None]);

        let report = aggregate_results_dir(dir.path()).unwrap();
        assert_eq!(report.populated_count(), 0);
        assert_eq!(report.best_cell, None);
        assert_eq!(
            report.cells[0].data,
            CellData::NoData {
                reason: NoDataReason::NoSuccessfulRequests
            }
        );
    }

    #[test]
    fn badly_named_and_corrupt_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        write_cell(dir.path(), RunTag::new(300, 1), &[Some(0.1)]);
        fs::write(dir.path().join("results_latest.csv"), "garbage").unwrap();
        fs::write(dir.path().join("results_mi300_c2.csv"), "id,client_id\nx,\n").unwrap();

        let report = aggregate_results_dir(dir.path()).unwrap();
        let skipped: Vec<&str> = report.skipped.iter().map(|s| s.file.as_str()).collect();
        assert_eq!(skipped, vec!["results_latest.csv", "results_mi300_c2.csv"]);
        assert_eq!(report.populated_count(), 1);
        assert!(matches!(
            report.cell(RunTag::new(300, 2)).unwrap().data,
            CellData::NoData {
                reason: NoDataReason::Corrupt(_)
            }
        ));
    }

    #[test]
    fn best_cell_is_scored() {
        let dir = TempDir::new().unwrap();
        write_cell(dir.path(), RunTag::new(300, 1), &[Some(0.9)]);
        write_cell(dir.path(), RunTag::new(300, 2), &[Some(0.1)]);

        let report = aggregate_results_dir(dir.path()).unwrap();
        assert_eq!(report.best_cell, Some(RunTag::new(300, 2)));
        assert!(report.cells.iter().all(|cell| cell.tradeoff_score.is_some()));
    }
}
