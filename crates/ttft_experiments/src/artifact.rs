//! Per-run artifact files: the request CSV and the metadata JSON.
//!
//! The CSV header is `id,client_id,start_s,first_token_s,end_s,status,error`.
//! Both files are written to a `.partial` sibling first and renamed into place,
//! so a crashed run never leaves a half-written file under an artifact name.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use ttft_core::contract::METADATA_SCHEMA_VERSION;
use ttft_core::storage_keys::{artifact_path, ArtifactKind};
use ttft_core::{RequestBudget, RunSpec, RunTag};

use crate::metrics::{RequestRecord, RunMetrics};

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} is not a usable artifact: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

impl ArtifactError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Metadata written beside every results CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub schema_version: String,
    pub run_tag: RunTag,
    pub max_inflight: u32,
    pub concurrency: u32,
    pub request_budget: RequestBudget,
    pub prompt: String,
    pub max_output_tokens: u32,
    pub target: String,
    pub total_requests: usize,
    pub successful_requests: usize,
    pub p50_ttft_s: Option<f64>,
    pub p95_ttft_s: Option<f64>,
    pub p99_ttft_s: Option<f64>,
    pub throughput_rps: f64,
    pub duration_s: f64,
    #[serde(default)]
    pub queue_depth_before: Option<f64>,
    #[serde(default)]
    pub queue_depth_after: Option<f64>,
}

impl RunMetadata {
    pub fn new(spec: &RunSpec, target: &str, metrics: &RunMetrics) -> Self {
        Self {
            schema_version: METADATA_SCHEMA_VERSION.to_string(),
            run_tag: spec.tag(),
            max_inflight: spec.max_inflight(),
            concurrency: spec.concurrency(),
            request_budget: spec.request_budget(),
            prompt: spec.prompt().to_string(),
            max_output_tokens: spec.max_output_tokens(),
            target: target.to_string(),
            total_requests: metrics.total_requests,
            successful_requests: metrics.successful_requests,
            p50_ttft_s: metrics.ttft.map(|ttft| ttft.p50_s),
            p95_ttft_s: metrics.ttft.map(|ttft| ttft.p95_s),
            p99_ttft_s: metrics.ttft.map(|ttft| ttft.p99_s),
            throughput_rps: metrics.throughput_rps,
            duration_s: metrics.duration_s,
            queue_depth_before: None,
            queue_depth_after: None,
        }
    }
}

/// Queue depth observed on the server side around a run, when available.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueueDepthSnapshot {
    pub before: Option<f64>,
    pub after: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunArtifacts {
    pub results_csv: PathBuf,
    pub metadata_json: PathBuf,
    pub metrics: RunMetrics,
}

/// Write the request CSV and metadata for one run into `results_dir`.
pub fn persist_run_artifacts(
    results_dir: &Path,
    spec: &RunSpec,
    target: &str,
    records: &[RequestRecord],
    queue_depth: QueueDepthSnapshot,
) -> Result<RunArtifacts, ArtifactError> {
    let tag = spec.tag();
    let metrics = RunMetrics::from_records(records);

    let results_csv = artifact_path(results_dir, ArtifactKind::Results, tag);
    write_results_csv(&results_csv, records)?;

    let mut metadata = RunMetadata::new(spec, target, &metrics);
    metadata.queue_depth_before = queue_depth.before;
    metadata.queue_depth_after = queue_depth.after;
    let metadata_json = artifact_path(results_dir, ArtifactKind::Metadata, tag);
    write_metadata_json(&metadata_json, &metadata)?;

    Ok(RunArtifacts {
        results_csv,
        metadata_json,
        metrics,
    })
}

pub fn write_results_csv(path: &Path, records: &[RequestRecord]) -> Result<(), ArtifactError> {
    let partial = partial_path(path);
    let file = File::create(&partial).map_err(|error| ArtifactError::io(&partial, error))?;

    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    for record in records {
        writer.serialize(record).map_err(|source| ArtifactError::Csv {
            path: partial.clone(),
            source,
        })?;
    }
    writer
        .flush()
        .map_err(|error| ArtifactError::io(&partial, error))?;
    drop(writer);

    fs::rename(&partial, path).map_err(|error| ArtifactError::io(path, error))
}

/// Read a request CSV, rejecting files that cannot describe a run.
pub fn read_results_csv(path: &Path) -> Result<Vec<RequestRecord>, ArtifactError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| ArtifactError::Csv {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    for row in reader.deserialize::<RequestRecord>() {
        let record = row.map_err(|source| ArtifactError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        validate_record(path, &record)?;
        records.push(record);
    }

    if records.is_empty() {
        return Err(ArtifactError::Invalid {
            path: path.to_path_buf(),
            reason: "no request rows".to_string(),
        });
    }
    Ok(records)
}

fn validate_record(path: &Path, record: &RequestRecord) -> Result<(), ArtifactError> {
    let invalid = |reason: String| ArtifactError::Invalid {
        path: path.to_path_buf(),
        reason,
    };

    if !record.start_s.is_finite() || !record.end_s.is_finite() {
        return Err(invalid(format!("request {} has non-finite timestamps", record.id)));
    }
    if record.end_s < record.start_s {
        return Err(invalid(format!("request {} ends before it starts", record.id)));
    }
    if let Some(first_token) = record.first_token_s {
        if !first_token.is_finite() || first_token < record.start_s || first_token > record.end_s {
            return Err(invalid(format!(
                "request {} has a first token outside its lifetime",
                record.id
            )));
        }
    }
    Ok(())
}

pub fn write_metadata_json(path: &Path, metadata: &RunMetadata) -> Result<(), ArtifactError> {
    write_json_atomically(path, metadata)
}

pub fn read_metadata_json(path: &Path) -> Result<RunMetadata, ArtifactError> {
    read_json(path)
}

pub(crate) fn write_json_atomically(
    path: &Path,
    value: &impl Serialize,
) -> Result<(), ArtifactError> {
    let partial = partial_path(path);
    let file = File::create(&partial).map_err(|error| ArtifactError::io(&partial, error))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| ArtifactError::Json {
        path: partial.clone(),
        source,
    })?;
    writer
        .flush()
        .map_err(|error| ArtifactError::io(&partial, error))?;
    drop(writer);

    fs::rename(&partial, path).map_err(|error| ArtifactError::io(path, error))
}

/// Delete every artifact a previous attempt left for `tag`; returns how many were removed.
pub fn remove_run_artifacts(results_dir: &Path, tag: RunTag) -> Result<usize, ArtifactError> {
    let mut removed = 0;
    for kind in ArtifactKind::ALL {
        let path = artifact_path(results_dir, kind, tag);
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => return Err(ArtifactError::io(&path, error)),
        }
    }
    Ok(removed)
}

pub(crate) fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ArtifactError> {
    let file = File::open(path).map_err(|error| ArtifactError::io(path, error))?;
    serde_json::from_reader(std::io::BufReader::new(file)).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RequestStatus;
    use tempfile::TempDir;

    fn records() -> Vec<RequestRecord> {
        vec![
            RequestRecord {
                id: "c0-r0".to_string(),
                client_id: 0,
                start_s: 0.0,
                first_token_s: Some(0.12),
                end_s: 0.9,
                status: RequestStatus::Ok,
                error: None,
            },
            RequestRecord {
                id: "c1-r0".to_string(),
                client_id: 1,
                start_s: 0.01,
                first_token_s: None,
                end_s: 0.4,
                status: RequestStatus::Error,
                error: Some("connection failed: refused".to_string()),
            },
        ]
    }

    #[test]
    fn csv_header_matches_artifact_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results_mi300_c2.csv");
        write_results_csv(&path, &records()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let header = contents.lines().next().unwrap();
        assert_eq!(header, "id,client_id,start_s,first_token_s,end_s,status,error");
        assert!(contents.contains("c1-r0,1,0.01,,0.4,error,connection failed: refused"));
        assert!(!dir.path().join("results_mi300_c2.csv.partial").exists());
    }

    #[test]
    fn csv_reads_back_missing_first_token_as_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results_mi300_c2.csv");
        write_results_csv(&path, &records()).unwrap();

        let read = read_results_csv(&path).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[1].first_token_s, None);
        assert_eq!(read[1].error.as_deref(), Some("connection failed: refused"));
    }

    #[test]
    fn rejects_header_only_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results_mi300_c2.csv");
        fs::write(&path, "id,client_id,start_s,first_token_s,end_s,status,error\n").unwrap();

        assert!(matches!(
            read_results_csv(&path),
            Err(ArtifactError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_truncated_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results_mi300_c2.csv");
        fs::write(
            &path,
            "id,client_id,start_s,first_token_s,end_s,status,error\nc0-r0,0,0.0,0.1\n",
        )
        .unwrap();

        assert!(matches!(read_results_csv(&path), Err(ArtifactError::Csv { .. })));
    }

    #[test]
    fn rejects_first_token_after_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results_mi300_c2.csv");
        fs::write(
            &path,
            "id,client_id,start_s,first_token_s,end_s,status,error\nc0-r0,0,0.0,2.0,1.0,ok,\n",
        )
        .unwrap();

        assert!(matches!(
            read_results_csv(&path),
            Err(ArtifactError::Invalid { .. })
        ));
    }

    #[test]
    fn persists_metadata_with_queue_depth() {
        let dir = TempDir::new().unwrap();
        let spec = RunSpec::new(350, 2, RequestBudget::PerClient(1), "Hello world", 64).unwrap();
        let artifacts = persist_run_artifacts(
            dir.path(),
            &spec,
            "http://localhost:8080",
            &records(),
            QueueDepthSnapshot {
                before: Some(0.0),
                after: Some(3.5),
            },
        )
        .unwrap();

        assert!(artifacts.results_csv.ends_with("results_mi350_c2.csv"));
        let metadata = read_metadata_json(&artifacts.metadata_json).unwrap();
        assert_eq!(metadata.run_tag, RunTag::new(350, 2));
        assert_eq!(metadata.successful_requests, 1);
        assert_eq!(metadata.queue_depth_after, Some(3.5));
        assert_eq!(metadata.p50_ttft_s, Some(0.12));
    }

    #[test]
    fn json_write_is_complete_and_leaves_no_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metadata_mi350_c2.json");
        let spec = RunSpec::new(350, 2, RequestBudget::PerClient(1), "Hello world", 64).unwrap();
        let metrics = RunMetrics::from_records(&records());
        let metadata = RunMetadata::new(&spec, "http://localhost:8080", &metrics);

        write_metadata_json(&path, &metadata).unwrap();
        let loaded = read_metadata_json(&path).unwrap();
        assert_eq!(loaded.run_tag, metadata.run_tag);
        assert_eq!(loaded.target, "http://localhost:8080");
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn failed_json_write_keeps_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sweep_manifest.json");
        fs::write(&path, "{\"previous\":true}").unwrap();

        // Non-string map keys cannot be encoded as JSON.
        let unencodable: std::collections::BTreeMap<(u8, u8), u8> = [((1, 2), 3)].into();
        assert!(matches!(
            write_json_atomically(&path, &unencodable),
            Err(ArtifactError::Json { .. })
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"previous\":true}");
    }

    #[test]
    fn removes_every_artifact_of_one_tag() {
        let dir = TempDir::new().unwrap();
        let tag = RunTag::new(400, 300);
        for kind in ArtifactKind::ALL {
            fs::write(artifact_path(dir.path(), kind, tag), "stale").unwrap();
        }
        let other = artifact_path(dir.path(), ArtifactKind::Results, RunTag::new(400, 400));
        fs::write(&other, "keep").unwrap();

        assert_eq!(remove_run_artifacts(dir.path(), tag).unwrap(), 3);
        assert_eq!(remove_run_artifacts(dir.path(), tag).unwrap(), 0);
        for kind in ArtifactKind::ALL {
            assert!(!artifact_path(dir.path(), kind, tag).exists());
        }
        assert!(other.exists());
    }
}
