//! Error types for tern-compile

use thiserror::Error;

/// Compilation errors, always attributed to the node being rendered.
#[derive(Error, Debug)]
pub enum CompileError {
    /// C001: a ref() points at nothing in the manifest
    #[error("[C001] Compilation error in {node}: ref to unknown node '{reference}'")]
    UnresolvedRef { node: String, reference: String },

    /// C002: a source() points at nothing in the manifest
    #[error("[C002] Compilation error in {node}: unknown source '{source_name}.{table}'")]
    UnresolvedSource {
        node: String,
        source_name: String,
        table: String,
    },

    /// C003: rendering failed for any other reason
    #[error("[C003] Compilation error in {node}: {reason}")]
    Rendering { node: String, reason: String },

    /// C999: internal invariant violation
    #[error("[C999] Internal compiler error: {0}")]
    Internal(String),
}

/// Result type alias for CompileError
pub type CompileResult<T> = Result<T, CompileError>;
