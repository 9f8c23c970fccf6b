//! In-memory adapter backend.
//!
//! Executes nothing: statements are recorded, outcomes are scripted. The
//! default target for projects without a warehouse profile, and the backend
//! every scheduler test runs against.

use crate::error::{DbError, DbResult};
use crate::traits::{Adapter, AdapterResponse, ResultTable};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A statement the adapter was asked to run.
#[derive(Debug, Clone)]
pub struct RecordedStatement {
    pub connection: String,
    pub sql: String,
}

/// Scriptable in-memory warehouse.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    executed: Mutex<Vec<RecordedStatement>>,
    /// sql-substring -> error message; a statement containing the substring
    /// fails with the message.
    failures: Mutex<HashMap<String, String>>,
    /// sql-substring -> scripted result rows for fetching statements.
    fetch_results: Mutex<HashMap<String, Vec<Vec<Value>>>>,
    open: Mutex<HashSet<String>>,
    cancelled: AtomicBool,
    latency: Option<Duration>,
    cancelable: bool,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self {
            cancelable: true,
            ..Self::default()
        }
    }

    /// Sleep this long inside every execute, so concurrency tests have a
    /// window to interleave.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Report `is_cancelable() == false`, like warehouses that cannot kill
    /// queries.
    pub fn without_cancellation(mut self) -> Self {
        self.cancelable = false;
        self
    }

    /// Script a failure: any statement containing `marker` errors with
    /// `message`.
    pub fn fail_on(&self, marker: &str, message: &str) {
        self.lock(&self.failures)
            .insert(marker.to_string(), message.to_string());
    }

    /// Script rows returned by fetching statements containing `marker`.
    pub fn fetch_returns(&self, marker: &str, rows: Vec<Vec<Value>>) {
        self.lock(&self.fetch_results).insert(marker.to_string(), rows);
    }

    /// Every statement executed so far, in completion order.
    pub fn executed(&self) -> Vec<RecordedStatement> {
        self.lock(&self.executed).clone()
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn execute(
        &self,
        connection: &str,
        sql: &str,
        _auto_begin: bool,
        fetch: bool,
    ) -> DbResult<(AdapterResponse, ResultTable)> {
        self.lock(&self.open).insert(connection.to_string());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(DbError::Cancelled(connection.to_string()));
        }

        let failure = self
            .lock(&self.failures)
            .iter()
            .find(|(marker, _)| sql.contains(marker.as_str()))
            .map(|(_, message)| message.clone());
        if let Some(message) = failure {
            return Err(DbError::Execution(message));
        }

        self.lock(&self.executed).push(RecordedStatement {
            connection: connection.to_string(),
            sql: sql.to_string(),
        });

        let table = if fetch {
            let rows = self
                .lock(&self.fetch_results)
                .iter()
                .find(|(marker, _)| sql.contains(marker.as_str()))
                .map(|(_, rows)| rows.clone())
                .unwrap_or_else(|| vec![vec![Value::from(0u64)]]);
            ResultTable {
                columns: vec!["value".to_string()],
                rows,
            }
        } else {
            ResultTable::default()
        };

        Ok((AdapterResponse::ok(), table))
    }

    fn release_connection(&self, connection: &str) {
        self.lock(&self.open).remove(connection);
    }

    fn cancel_open_connections(&self) -> Vec<String> {
        self.cancelled.store(true, Ordering::SeqCst);
        let mut names: Vec<String> = self.lock(&self.open).iter().cloned().collect();
        names.sort();
        names
    }

    fn is_cancelable(&self) -> bool {
        self.cancelable
    }

    fn adapter_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_records_statements() {
        let adapter = MemoryAdapter::new();
        adapter
            .execute("model.pkg.a", "create view a as select 1", true, false)
            .await
            .unwrap();
        let executed = adapter.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].connection, "model.pkg.a");
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let adapter = MemoryAdapter::new();
        adapter.fail_on("broken_table", "relation does not exist");
        let err = adapter
            .execute("c", "select * from broken_table", false, true)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Execution(_)));
        assert!(adapter.executed().is_empty());
    }

    #[tokio::test]
    async fn test_scripted_fetch_rows() {
        let adapter = MemoryAdapter::new();
        adapter.fetch_returns("count(*)", vec![vec![Value::from(3u64)]]);
        let (_, table) = adapter
            .execute("c", "select count(*) from t", false, true)
            .await
            .unwrap();
        assert_eq!(table.scalar_u64(), Some(3));
    }

    #[tokio::test]
    async fn test_cancel_names_open_connections() {
        let adapter = MemoryAdapter::new();
        adapter.execute("model.pkg.a", "select 1", false, false).await.unwrap();
        // connection stays open until released
        assert_eq!(adapter.cancel_open_connections(), vec!["model.pkg.a"]);

        // post-cancel executes fail
        let err = adapter.execute("c2", "select 2", false, false).await.unwrap_err();
        assert!(matches!(err, DbError::Cancelled(_)));

        adapter.release_connection("model.pkg.a");
        assert!(adapter.cancel_open_connections().is_empty());
    }
}
