//! Previous-state comparison input for `state:`, `result:`, and
//! `source_status:` selector methods.
//!
//! A state directory is the `target/` output of a prior run: a manifest,
//! a run-results artifact, and a source-freshness artifact. Any of the
//! three may be absent; selectors that need a missing one fail with a
//! descriptive error instead of silently matching nothing.

use crate::error::{CoreError, CoreResult};
use crate::manifest::Manifest;
use crate::results::RunResultsArtifact;
use crate::unique_id::UniqueId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

const MANIFEST_FILE: &str = "manifest.json";
const RESULTS_FILE: &str = "run_results.json";
const SOURCES_FILE: &str = "sources.json";

/// One source's freshness check outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessResult {
    pub unique_id: UniqueId,
    /// Newest load timestamp observed; absent when the check errored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_loaded_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The source-freshness artifact (`sources.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessArtifact {
    pub generated_at: DateTime<Utc>,
    pub results: Vec<FreshnessResult>,
}

impl FreshnessArtifact {
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::IoWithPath {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }
}

/// Snapshot of a prior run used for comparison-based selection.
#[derive(Debug, Default)]
pub struct PreviousState {
    pub manifest: Option<Manifest>,
    pub results: Option<RunResultsArtifact>,
    pub sources: Option<FreshnessArtifact>,
    /// Freshness artifact from the *current* target path, compared against
    /// `sources` by the `source_status:fresher` method.
    pub sources_current: Option<FreshnessArtifact>,
}

impl PreviousState {
    /// Load whatever comparison artifacts exist under `state_path`, plus
    /// the current freshness artifact under `target_path`.
    pub fn load(state_path: &Path, target_path: &Path) -> CoreResult<Self> {
        let manifest_path = state_path.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            Some(Manifest::load(&manifest_path)?)
        } else {
            log::debug!("no comparison manifest at {}", manifest_path.display());
            None
        };

        let results_path = state_path.join(RESULTS_FILE);
        let results = if results_path.exists() {
            Some(RunResultsArtifact::load(&results_path)?)
        } else {
            None
        };

        let sources_path = state_path.join(SOURCES_FILE);
        let sources = if sources_path.exists() {
            Some(FreshnessArtifact::load(&sources_path)?)
        } else {
            None
        };

        let current_path = target_path.join(SOURCES_FILE);
        let sources_current = if current_path.exists() {
            Some(FreshnessArtifact::load(&current_path)?)
        } else {
            None
        };

        Ok(Self {
            manifest,
            results,
            sources,
            sources_current,
        })
    }
}
