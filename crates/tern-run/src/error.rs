//! Error types for tern-run

use tern_core::error::CoreError;
use thiserror::Error;

/// Errors that abort a run.
#[derive(Error, Debug)]
pub enum RunError {
    /// R001: fail-fast tripped by an error or test failure
    #[error("[R001] Failing early due to test failure or runtime error in {unique_id}")]
    FailFast { unique_id: String },

    /// R002: external interrupt (ctrl-c)
    #[error("[R002] Run cancelled by interrupt")]
    Interrupted,

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type alias for RunError
pub type TaskResult<T> = Result<T, RunError>;
