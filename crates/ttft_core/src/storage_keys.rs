use std::path::{Path, PathBuf};

use crate::contract::RunTag;

pub const MANIFEST_FILE_NAME: &str = "sweep_manifest.json";
pub const SUMMARY_CSV_FILE_NAME: &str = "summary_all_runs.csv";
pub const SUMMARY_JSON_FILE_NAME: &str = "summary_report.json";
pub const SUMMARY_PARQUET_FILE_NAME: &str = "summary_all_runs.parquet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Results,
    Metadata,
    GpuMetrics,
}

impl ArtifactKind {
    pub const ALL: [Self; 3] = [Self::Results, Self::Metadata, Self::GpuMetrics];

    fn prefix(self) -> &'static str {
        match self {
            Self::Results => "results_",
            Self::Metadata => "metadata_",
            Self::GpuMetrics => "gpu_metrics_",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::Results => ".csv",
            Self::Metadata => ".json",
            Self::GpuMetrics => ".log",
        }
    }

    /// Whether a file name claims to be an artifact of this kind.
    pub fn matches(self, file_name: &str) -> bool {
        file_name.starts_with(self.prefix()) && file_name.ends_with(self.extension())
    }
}

pub fn artifact_file_name(kind: ArtifactKind, tag: RunTag) -> String {
    format!("{}{tag}{}", kind.prefix(), kind.extension())
}

pub fn artifact_path(results_dir: &Path, kind: ArtifactKind, tag: RunTag) -> PathBuf {
    results_dir.join(artifact_file_name(kind, tag))
}

/// Recover the run tag from an artifact file name, if it follows the naming discipline.
pub fn parse_artifact_file_name(kind: ArtifactKind, file_name: &str) -> Option<RunTag> {
    file_name
        .strip_prefix(kind.prefix())?
        .strip_suffix(kind.extension())?
        .parse()
        .ok()
}

/// Each sweep profile writes into its own subdirectory of the results root.
pub fn profile_results_dir(results_root: &Path, profile_name: &str) -> PathBuf {
    results_root.join(profile_name)
}
