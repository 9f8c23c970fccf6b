//! Run results: one record per attempted node, plus the on-disk artifact.

use crate::error::{CoreError, CoreResult};
use crate::unique_id::UniqueId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use uuid::Uuid;

/// Final status of one attempted node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Model/seed/snapshot built successfully
    Success,
    /// Test passed
    Pass,
    /// Compile or execute raised an error
    Error,
    /// Test assertion failed
    Fail,
    /// Test failed but is configured as warn-severity
    Warn,
    /// Not executed because an upstream dependency failed
    Skipped,
    /// The orchestrator itself failed while handling the node
    #[serde(rename = "runtime error")]
    RuntimeErr,
}

impl NodeStatus {
    /// Statuses that mark the node (and therefore the run) as failed.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            NodeStatus::Error | NodeStatus::Fail | NodeStatus::RuntimeErr
        )
    }

    /// Statuses that propagate a skip to every transitive dependent.
    pub fn propagates_skip(self) -> bool {
        matches!(self, NodeStatus::Error | NodeStatus::RuntimeErr)
    }

    /// Statuses that trip fail-fast.
    pub fn trips_fail_fast(self) -> bool {
        matches!(self, NodeStatus::Error | NodeStatus::Fail)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStatus::Success => "success",
            NodeStatus::Pass => "pass",
            NodeStatus::Error => "error",
            NodeStatus::Fail => "fail",
            NodeStatus::Warn => "warn",
            NodeStatus::Skipped => "skipped",
            NodeStatus::RuntimeErr => "runtime error",
        };
        f.write_str(s)
    }
}

/// Result record for one attempted (or skipped) node. Created once by the
/// worker that finished the node and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub unique_id: UniqueId,
    pub status: NodeStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Wall-clock seconds spent in compile + execute.
    pub execution_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Adapter-specific response payload, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_response: Option<Value>,
    /// Failing-row count for tests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failures: Option<u64>,
    /// For skipped nodes, the upstream node whose failure caused the skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_cause: Option<UniqueId>,
}

impl RunResult {
    /// A zero-duration result, used for skips and ephemeral compiles.
    pub fn immediate(unique_id: UniqueId, status: NodeStatus, message: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            unique_id,
            status,
            started_at: now,
            completed_at: now,
            execution_time: 0.0,
            message,
            adapter_response: None,
            failures: None,
            skip_cause: None,
        }
    }
}

/// The run-results artifact written at the end of a run and consumed by
/// `result:` and `source_status:` selectors on the next one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResultsArtifact {
    pub generated_at: DateTime<Utc>,
    /// Unique id of the invocation that produced this artifact.
    pub invocation_id: Uuid,
    /// Total elapsed seconds for the whole run.
    pub elapsed_time: f64,
    pub results: Vec<RunResult>,
}

impl RunResultsArtifact {
    pub fn new(results: Vec<RunResult>, elapsed_time: f64) -> Self {
        Self {
            generated_at: Utc::now(),
            invocation_id: Uuid::new_v4(),
            elapsed_time,
            results,
        }
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

    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}
