//! Error types for tern-core

use thiserror::Error;

/// Core error type for Tern
#[derive(Error, Debug)]
pub enum CoreError {
    /// G001: Circular dependency detected while linking the graph
    #[error("[G001] Found a cycle: {cycle}")]
    CircularDependency { cycle: String },

    /// G002: A node depends on an id that is not in the manifest
    #[error("[G002] Node '{node}' depends on '{dependency}', which was not found")]
    DependencyNotFound { node: String, dependency: String },

    /// G003: A selected node is missing from the graph
    #[error("[G003] Couldn't find node '{node}' -- does it exist or is it disabled?")]
    NodeNotInGraph { node: String },

    /// S001: Invalid selector expression
    #[error("[S001] Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// S002: Multiple exclude clauses at one nesting level
    #[error("[S002] Cannot provide multiple exclude arguments to the same selector set operator")]
    MultipleExcludes,

    /// S003: Malformed root-level selector definition
    #[error("[S003] Invalid root-level selector definition: {reason}")]
    InvalidRootDefinition { reason: String },

    /// S004: An explicit selection matched no nodes
    #[error("[S004] The selection criterion '{selector}' does not match any nodes")]
    NoNodesForSelection { selector: String },

    /// S005: Selector requires previous state that was not supplied
    #[error("[S005] Got a '{method}' selector method, but no comparison {artifact} was given")]
    MissingPreviousState {
        method: String,
        artifact: &'static str,
    },

    /// E001: IO error with file path context
    #[error("[E001] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// E002: JSON serialization/deserialization error
    #[error("[E002] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// E003: YAML parse error
    #[error("[E003] YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// E999: Internal invariant violation; always a bug, never recoverable
    #[error("[E999] Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for an internal invariant violation.
    pub fn internal(msg: impl Into<String>) -> Self {
        CoreError::Internal(msg.into())
    }
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
