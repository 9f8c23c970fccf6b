//! Adapter trait definition

use crate::error::DbResult;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Adapter-reported outcome of one executed statement.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterResponse {
    /// Short status message, e.g. `OK` or `CREATE VIEW`
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
}

impl AdapterResponse {
    pub fn ok() -> Self {
        Self {
            message: "OK".to_string(),
            rows_affected: None,
        }
    }
}

/// Tabular result of a fetching statement.
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The first cell of the first row as an unsigned count. Test runners
    /// read failure counts this way.
    pub fn scalar_u64(&self) -> Option<u64> {
        self.rows.first()?.first()?.as_u64()
    }
}

/// Warehouse abstraction trait for Tern
///
/// Implementations must be Send + Sync for async operation. Connections are
/// addressed by name; the scheduler names each connection after the node it
/// is running so cancellations can be attributed.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Execute one statement on a named connection, opening the connection
    /// on first use. `fetch` asks for a result table.
    async fn execute(
        &self,
        connection: &str,
        sql: &str,
        auto_begin: bool,
        fetch: bool,
    ) -> DbResult<(AdapterResponse, ResultTable)>;

    /// Release a named connection if it is open. Safe to call on every exit
    /// path, including after cancellation.
    fn release_connection(&self, connection: &str);

    /// Ask the warehouse to cancel every in-flight query, returning the
    /// names of the connections that were told to cancel.
    fn cancel_open_connections(&self) -> Vec<String>;

    /// Whether this adapter can cancel in-flight queries at all.
    fn is_cancelable(&self) -> bool {
        true
    }

    /// Adapter type identifier for logging
    fn adapter_type(&self) -> &'static str;
}
