//! The sweep manifest: the grid a sweep intended to run and how each cell ended.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ttft_core::contract::{profile_fingerprint, MANIFEST_SCHEMA_VERSION};
use ttft_core::storage_keys::MANIFEST_FILE_NAME;
use ttft_core::{RunTag, SweepProfile};

use crate::artifact::{read_json, write_json_atomically, ArtifactError};
use crate::executor::RunOutcome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepManifest {
    pub schema_version: String,
    pub profile: SweepProfile,
    pub profile_fingerprint: String,
    pub created_at: DateTime<Utc>,
    /// Expected run tags in sweep order.
    pub cells: Vec<RunTag>,
    #[serde(default)]
    pub outcomes: Vec<RunOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SweepManifest {
    pub fn new(profile: &SweepProfile, cells: Vec<RunTag>) -> Result<Self, serde_json::Error> {
        Ok(Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            profile: profile.clone(),
            profile_fingerprint: profile_fingerprint(profile)?,
            created_at: Utc::now(),
            cells,
            outcomes: Vec::new(),
            completed_at: None,
        })
    }

    pub fn complete(&mut self, outcomes: Vec<RunOutcome>) {
        self.outcomes = outcomes;
        self.completed_at = Some(Utc::now());
    }
}

pub fn write_manifest(results_dir: &Path, manifest: &SweepManifest) -> Result<(), ArtifactError> {
    write_json_atomically(&results_dir.join(MANIFEST_FILE_NAME), manifest)
}

/// Load the manifest of a results directory; `Ok(None)` when there is none.
pub fn read_manifest(results_dir: &Path) -> Result<Option<SweepManifest>, ArtifactError> {
    let path = results_dir.join(MANIFEST_FILE_NAME);
    if !path.is_file() {
        return Ok(None);
    }

    let manifest: SweepManifest = read_json(&path)?;
    if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
        return Err(ArtifactError::Invalid {
            path,
            reason: format!("unsupported schema version '{}'", manifest.schema_version),
        });
    }
    Ok(Some(manifest))
}
