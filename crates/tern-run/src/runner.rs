//! Per-resource-type runners.
//!
//! A runner owns one node for the duration of its compile + execute. The
//! runner type is resolved once per node from the resource-type enum; the
//! scheduler drives the `compile -> execute` pair and the observer hooks.

use crate::observer::RunObserver;
use async_trait::async_trait;
use std::sync::Arc;
use tern_compile::{CompileError, CompileResult, Renderer};
use tern_core::error::{CoreError, CoreResult};
use tern_core::manifest::{GraphMember, Manifest, ManifestNode, SourceDefinition};
use tern_core::node::ResourceType;
use tern_core::results::{NodeStatus, RunResult};
use tern_core::unique_id::UniqueId;
use tern_db::{Adapter, AdapterResponse, DbResult, ResultTable};

/// Whether nodes execute against the warehouse or only compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Execute,
    CompileOnly,
}

/// The output of a runner's compile step.
#[derive(Debug, Clone)]
pub struct Compiled {
    /// Executable statement for the adapter.
    pub statement: String,
    /// The compiled manifest node to write back, when the runner operates
    /// on an executable node (freshness checks compile a statement only).
    pub node: Option<ManifestNode>,
}

/// The outcome a runner reports from its execute step.
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub status: NodeStatus,
    pub message: Option<String>,
    pub adapter_response: Option<serde_json::Value>,
    pub failures: Option<u64>,
}

impl ExecuteOutcome {
    fn success(message: impl Into<String>, response: &AdapterResponse) -> Self {
        Self {
            status: NodeStatus::Success,
            message: Some(message.into()),
            adapter_response: serde_json::to_value(response).ok(),
            failures: None,
        }
    }
}

/// The execution context a worker owns while running one node: the adapter
/// plus the named connection. Dropping the context releases the connection,
/// so every exit path gives it back.
pub struct WorkerContext {
    adapter: Arc<dyn Adapter>,
    connection_name: String,
}

impl WorkerContext {
    pub fn new(adapter: Arc<dyn Adapter>, connection_name: String) -> Self {
        Self {
            adapter,
            connection_name,
        }
    }

    pub async fn execute(
        &self,
        sql: &str,
        auto_begin: bool,
        fetch: bool,
    ) -> DbResult<(AdapterResponse, ResultTable)> {
        self.adapter
            .execute(&self.connection_name, sql, auto_begin, fetch)
            .await
    }
}

impl Drop for WorkerContext {
    fn drop(&mut self) {
        self.adapter.release_connection(&self.connection_name);
    }
}

/// Why a node is being skipped instead of run.
#[derive(Debug, Clone)]
pub struct SkipCause {
    pub unique_id: UniqueId,
    /// The upstream failure was an ephemeral model's compile error.
    pub ephemeral: bool,
    pub message: Option<String>,
}

/// Build the skip result for a node, chaining the upstream cause.
pub fn skip_result(unique_id: &UniqueId, cause: Option<&SkipCause>) -> RunResult {
    let (message, skip_cause) = match cause {
        Some(cause) if cause.ephemeral => (
            format!(
                "Compilation error in an upstream ephemeral model {}: {}",
                cause.unique_id,
                cause.message.as_deref().unwrap_or("unknown error")
            ),
            Some(cause.unique_id.clone()),
        ),
        Some(cause) => (
            format!("Skipping because upstream node {} failed", cause.unique_id),
            Some(cause.unique_id.clone()),
        ),
        None => ("Skipping due to an upstream failure".to_string(), None),
    };
    let mut result = RunResult::immediate(unique_id.clone(), NodeStatus::Skipped, Some(message));
    result.skip_cause = skip_cause;
    result
}

/// Contract every runner satisfies: a pure compile via the renderer seam, an
/// execute via the adapter seam, status-line hooks, and a skip path.
#[async_trait]
pub trait NodeRunner: Send + Sync {
    fn unique_id(&self) -> &UniqueId;

    /// One-line description used in status lines.
    fn describe(&self) -> String;

    /// Pure transformation: render the node and shape the statement the
    /// adapter will run. Never touches the warehouse.
    fn compile(&self, manifest: &Manifest, renderer: &dyn Renderer) -> CompileResult<Compiled>;

    /// Run the compiled statement through the worker's connection.
    async fn execute(&self, compiled: &Compiled, ctx: &WorkerContext) -> DbResult<ExecuteOutcome>;

    fn before_execute(&self, observer: &dyn RunObserver, index: usize, total: usize) {
        observer.on_node_start(&self.describe(), index, total);
    }

    fn after_execute(
        &self,
        result: &RunResult,
        observer: &dyn RunObserver,
        index: usize,
        total: usize,
    ) {
        observer.on_node_finish(&self.describe(), result, index, total);
    }

    /// Produce the skip result for this node. Runners that must never be
    /// skipped return an error instead.
    fn on_skip(&self, cause: Option<&SkipCause>) -> CoreResult<RunResult> {
        Ok(skip_result(self.unique_id(), cause))
    }
}

/// Resolve the runner for a graph member. The dispatch is closed over the
/// resource-type enum and happens once per node, at pop time.
pub fn runner_for(member: &GraphMember<'_>, mode: RunMode) -> CoreResult<Box<dyn NodeRunner>> {
    match member {
        GraphMember::Node(node) => {
            let node = (*node).clone();
            if mode == RunMode::CompileOnly {
                return Ok(Box::new(CompileRunner { node }));
            }
            Ok(match node.resource_type {
                ResourceType::Model => Box::new(ModelRunner { node }),
                ResourceType::Test => Box::new(TestRunner { node }),
                ResourceType::Seed => Box::new(SeedRunner { node }),
                ResourceType::Snapshot => Box::new(SnapshotRunner { node }),
                ResourceType::Operation => Box::new(OperationRunner { node }),
                ResourceType::Analysis | ResourceType::Documentation => {
                    Box::new(CompileRunner { node })
                }
                other => {
                    return Err(CoreError::internal(format!(
                        "no runner for resource type {other}"
                    )))
                }
            })
        }
        GraphMember::Source(source) => Ok(Box::new(FreshnessRunner {
            source: (*source).clone(),
        })),
        GraphMember::Exposure(_) | GraphMember::Metric(_) => Err(CoreError::internal(
            "exposures and metrics are never executed",
        )),
    }
}

fn rendered_sql(node: &ManifestNode) -> String {
    node.compiled_sql.clone().unwrap_or_default()
}

/// Builds a model as a view or table from its compiled select.
pub struct ModelRunner {
    node: ManifestNode,
}

#[async_trait]
impl NodeRunner for ModelRunner {
    fn unique_id(&self) -> &UniqueId {
        &self.node.unique_id
    }

    fn describe(&self) -> String {
        format!(
            "{} model {}",
            self.node.materialized().unwrap_or("view"),
            self.node.relation_name()
        )
    }

    fn compile(&self, manifest: &Manifest, renderer: &dyn Renderer) -> CompileResult<Compiled> {
        let compiled = renderer.compile(&self.node, manifest)?;
        let relation = compiled.relation_name();
        let statement = match compiled.materialized() {
            Some("table") | Some("incremental") => format!(
                "create or replace table {} as (\n{}\n)",
                relation,
                rendered_sql(&compiled)
            ),
            Some("ephemeral") => rendered_sql(&compiled),
            _ => format!(
                "create or replace view {} as (\n{}\n)",
                relation,
                rendered_sql(&compiled)
            ),
        };
        Ok(Compiled {
            statement,
            node: Some(compiled),
        })
    }

    async fn execute(&self, compiled: &Compiled, ctx: &WorkerContext) -> DbResult<ExecuteOutcome> {
        let (response, _) = ctx.execute(&compiled.statement, true, false).await?;
        Ok(ExecuteOutcome::success(
            format!(
                "created {} {}",
                self.node.materialized().unwrap_or("view"),
                self.node.relation_name()
            ),
            &response,
        ))
    }
}

/// Runs a test's compiled assertion and counts failing rows.
pub struct TestRunner {
    node: ManifestNode,
}

impl TestRunner {
    fn warn_severity(&self) -> bool {
        self.node
            .config
            .get("severity")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|severity| severity.eq_ignore_ascii_case("warn"))
    }
}

#[async_trait]
impl NodeRunner for TestRunner {
    fn unique_id(&self) -> &UniqueId {
        &self.node.unique_id
    }

    fn describe(&self) -> String {
        format!("test {}", self.node.name)
    }

    fn compile(&self, manifest: &Manifest, renderer: &dyn Renderer) -> CompileResult<Compiled> {
        let compiled = renderer.compile(&self.node, manifest)?;
        let statement = format!(
            "select count(*) as failures from (\n{}\n) tern_test",
            rendered_sql(&compiled)
        );
        Ok(Compiled {
            statement,
            node: Some(compiled),
        })
    }

    async fn execute(&self, compiled: &Compiled, ctx: &WorkerContext) -> DbResult<ExecuteOutcome> {
        let (response, table) = ctx.execute(&compiled.statement, false, true).await?;
        let failures = table.scalar_u64().unwrap_or(0);
        let status = if failures == 0 {
            NodeStatus::Pass
        } else if self.warn_severity() {
            NodeStatus::Warn
        } else {
            NodeStatus::Fail
        };
        Ok(ExecuteOutcome {
            status,
            message: Some(format!("got {failures} result(s)")),
            adapter_response: serde_json::to_value(&response).ok(),
            failures: Some(failures),
        })
    }
}

/// Loads a seed's CSV into its relation.
pub struct SeedRunner {
    node: ManifestNode,
}

#[async_trait]
impl NodeRunner for SeedRunner {
    fn unique_id(&self) -> &UniqueId {
        &self.node.unique_id
    }

    fn describe(&self) -> String {
        format!("seed {}", self.node.relation_name())
    }

    fn compile(&self, manifest: &Manifest, renderer: &dyn Renderer) -> CompileResult<Compiled> {
        let compiled = renderer.compile(&self.node, manifest)?;
        let statement = format!(
            "copy {} from '{}'",
            compiled.relation_name(),
            compiled.original_file_path
        );
        Ok(Compiled {
            statement,
            node: Some(compiled),
        })
    }

    async fn execute(&self, compiled: &Compiled, ctx: &WorkerContext) -> DbResult<ExecuteOutcome> {
        let (response, _) = ctx.execute(&compiled.statement, true, false).await?;
        Ok(ExecuteOutcome::success(
            format!("loaded seed {}", self.node.relation_name()),
            &response,
        ))
    }
}

/// Rebuilds a type-2 snapshot table from its compiled select.
pub struct SnapshotRunner {
    node: ManifestNode,
}

#[async_trait]
impl NodeRunner for SnapshotRunner {
    fn unique_id(&self) -> &UniqueId {
        &self.node.unique_id
    }

    fn describe(&self) -> String {
        format!("snapshot {}", self.node.relation_name())
    }

    fn compile(&self, manifest: &Manifest, renderer: &dyn Renderer) -> CompileResult<Compiled> {
        let compiled = renderer.compile(&self.node, manifest)?;
        let statement = format!(
            "create or replace table {} as (\n{}\n)",
            compiled.relation_name(),
            rendered_sql(&compiled)
        );
        Ok(Compiled {
            statement,
            node: Some(compiled),
        })
    }

    async fn execute(&self, compiled: &Compiled, ctx: &WorkerContext) -> DbResult<ExecuteOutcome> {
        let (response, _) = ctx.execute(&compiled.statement, true, false).await?;
        Ok(ExecuteOutcome::success(
            format!("snapshotted {}", self.node.relation_name()),
            &response,
        ))
    }
}

/// Runs an on-run-start / on-run-end hook statement as-is.
pub struct OperationRunner {
    node: ManifestNode,
}

#[async_trait]
impl NodeRunner for OperationRunner {
    fn unique_id(&self) -> &UniqueId {
        &self.node.unique_id
    }

    fn describe(&self) -> String {
        format!("hook {}", self.node.name)
    }

    fn compile(&self, manifest: &Manifest, renderer: &dyn Renderer) -> CompileResult<Compiled> {
        let compiled = renderer.compile(&self.node, manifest)?;
        let statement = rendered_sql(&compiled);
        Ok(Compiled {
            statement,
            node: Some(compiled),
        })
    }

    async fn execute(&self, compiled: &Compiled, ctx: &WorkerContext) -> DbResult<ExecuteOutcome> {
        let (response, _) = ctx.execute(&compiled.statement, true, false).await?;
        Ok(ExecuteOutcome::success(
            format!("ran hook {}", self.node.name),
            &response,
        ))
    }
}

/// Compiles without executing: analyses, docs, and every node in a
/// compile-only run.
pub struct CompileRunner {
    node: ManifestNode,
}

#[async_trait]
impl NodeRunner for CompileRunner {
    fn unique_id(&self) -> &UniqueId {
        &self.node.unique_id
    }

    fn describe(&self) -> String {
        format!("compile {}", self.node.name)
    }

    fn compile(&self, manifest: &Manifest, renderer: &dyn Renderer) -> CompileResult<Compiled> {
        let compiled = renderer.compile(&self.node, manifest)?;
        let statement = rendered_sql(&compiled);
        Ok(Compiled {
            statement,
            node: Some(compiled),
        })
    }

    async fn execute(&self, _compiled: &Compiled, _ctx: &WorkerContext) -> DbResult<ExecuteOutcome> {
        Ok(ExecuteOutcome {
            status: NodeStatus::Success,
            message: Some("compiled".to_string()),
            adapter_response: None,
            failures: None,
        })
    }
}

/// Checks a source table's load recency. Freshness checks are never
/// skippable: a skipped check would silently report stale data as fresh.
pub struct FreshnessRunner {
    source: SourceDefinition,
}

#[async_trait]
impl NodeRunner for FreshnessRunner {
    fn unique_id(&self) -> &UniqueId {
        &self.source.unique_id
    }

    fn describe(&self) -> String {
        format!("freshness of {}.{}", self.source.source_name, self.source.name)
    }

    fn compile(&self, _manifest: &Manifest, _renderer: &dyn Renderer) -> CompileResult<Compiled> {
        let field = self.source.loaded_at_field.as_deref().ok_or_else(|| {
            CompileError::Rendering {
                node: self.source.unique_id.to_string(),
                reason: "source has no loaded_at_field".to_string(),
            }
        })?;
        let statement = format!(
            "select max({}) from {}",
            field,
            tern_compile::source_relation_name(&self.source)
        );
        Ok(Compiled {
            statement,
            node: None,
        })
    }

    async fn execute(&self, compiled: &Compiled, ctx: &WorkerContext) -> DbResult<ExecuteOutcome> {
        let (response, table) = ctx.execute(&compiled.statement, false, true).await?;
        let max_loaded_at = table.rows.first().and_then(|row| row.first()).cloned();
        Ok(ExecuteOutcome {
            status: NodeStatus::Success,
            message: Some(format!("checked freshness of {}", self.source.source_name)),
            adapter_response: max_loaded_at
                .map(|value| serde_json::json!({ "max_loaded_at": value }))
                .or_else(|| serde_json::to_value(&response).ok()),
            failures: None,
        })
    }

    fn on_skip(&self, _cause: Option<&SkipCause>) -> CoreResult<RunResult> {
        Err(CoreError::internal(format!(
            "freshness check {} cannot be skipped",
            self.source.unique_id
        )))
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
