//! Error types for tern-db

use thiserror::Error;

/// Adapter operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Connection failed: {0}")]
    Connection(String),

    /// Query execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    Execution(String),

    /// Query cancelled (D003)
    #[error("[D003] Query cancelled on connection '{0}'")]
    Cancelled(String),

    /// Internal error (D004)
    #[error("[D004] Internal adapter error: {0}")]
    Internal(String),
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;
