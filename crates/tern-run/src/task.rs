//! The graph-runnable task: drains a graph queue through a bounded worker
//! pool, collecting results and propagating skips.
//!
//! Workers never see a node before every dependency inside the subset graph
//! is done; that ordering lives in the queue. This module owns everything
//! after the pop: runner dispatch, the skip check, the completion callback
//! that writes the compiled node back and marks dependents, fail-fast, and
//! cooperative cancellation.

use crate::error::{RunError, TaskResult};
use crate::observer::RunObserver;
use crate::runner::{runner_for, NodeRunner, RunMode, SkipCause, WorkerContext};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tern_compile::Renderer;
use tern_core::error::CoreError;
use tern_core::graph::Graph;
use tern_core::manifest::{Manifest, ManifestNode};
use tern_core::queue::GraphQueue;
use tern_core::results::{NodeStatus, RunResult};
use tern_core::unique_id::UniqueId;
use tern_db::Adapter;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub threads: usize,
    pub fail_fast: bool,
    /// Run every node inline on the scheduler task, in deterministic order.
    pub single_threaded: bool,
    pub mode: RunMode,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            fail_fast: false,
            single_threaded: false,
            mode: RunMode::Execute,
        }
    }
}

/// What a run produced: every recorded result, plus the abort reason when
/// fail-fast or an interrupt cut it short. Results collected before the
/// abort are always preserved.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub results: Vec<RunResult>,
    pub aborted: Option<RunError>,
    pub elapsed: f64,
}

impl ExecutionOutcome {
    /// Whether the run counts as successful. Skips count as failures:
    /// every skip names a real upstream failure.
    pub fn success(&self) -> bool {
        self.aborted.is_none() && interpret_results(&self.results)
    }
}

/// True when no result carries a failing or skipped status.
pub fn interpret_results(results: &[RunResult]) -> bool {
    results
        .iter()
        .all(|r| !r.status.is_failure() && r.status != NodeStatus::Skipped)
}

struct Inner {
    manifest: Mutex<Manifest>,
    /// The full graph, used for transitive-descendant lookup when a failure
    /// propagates skips.
    graph: Graph,
    adapter: Arc<dyn Adapter>,
    renderer: Arc<dyn Renderer>,
    observer: Arc<dyn RunObserver>,
    config: RunConfig,
    results: Mutex<Vec<RunResult>>,
    skipped: Mutex<HashMap<UniqueId, SkipCause>>,
    /// Worker-side fatal errors are stashed here and raised on the next
    /// scheduler tick, never inside the worker where they would be lost.
    raise_next_tick: Mutex<Option<RunError>>,
    progress: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// Orchestrates one run over a selected subgraph.
pub struct RunnableTask {
    inner: Arc<Inner>,
}

impl RunnableTask {
    pub fn new(
        manifest: Manifest,
        graph: Graph,
        adapter: Arc<dyn Adapter>,
        renderer: Arc<dyn Renderer>,
        observer: Arc<dyn RunObserver>,
        config: RunConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                manifest: Mutex::new(manifest),
                graph,
                adapter,
                renderer,
                observer,
                config,
                results: Mutex::new(Vec::new()),
                skipped: Mutex::new(HashMap::new()),
                raise_next_tick: Mutex::new(None),
                progress: AtomicUsize::new(0),
            }),
        }
    }

    /// The manifest as updated by completed nodes.
    pub fn into_manifest(self) -> Manifest {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner.manifest.into_inner().unwrap_or_else(|p| p.into_inner()),
            Err(inner) => lock(&inner.manifest).clone(),
        }
    }

    /// Drain the queue through the worker pool and report the outcome.
    pub async fn execute_nodes(&self, queue: GraphQueue) -> TaskResult<ExecutionOutcome> {
        let started = Instant::now();
        let queue = Arc::new(queue);

        if queue.get_selected_nodes().is_empty() {
            log::warn!("Nothing to do. Try checking your model configs and selection arguments");
            return Ok(ExecutionOutcome {
                results: Vec::new(),
                aborted: None,
                elapsed: started.elapsed().as_secs_f64(),
            });
        }

        self.inner
            .observer
            .on_concurrency_line(self.inner.config.threads, queue.progress_count());

        let outcome = tokio::select! {
            result = self.run_queue(Arc::clone(&queue)) => result,
            _ = wait_for_interrupt() => Err(RunError::Interrupted),
        };

        let aborted = match outcome {
            Ok(()) => None,
            Err(err @ (RunError::FailFast { .. } | RunError::Interrupted)) => {
                // close out warehouse-side work; in-flight compiles may
                // still land and their results are kept
                self.cancel_connections();
                Some(err)
            }
            Err(other) => return Err(other),
        };

        let results = lock(&self.inner.results).clone();
        let elapsed = started.elapsed().as_secs_f64();
        self.inner.observer.on_run_end(&results, elapsed);
        Ok(ExecutionOutcome {
            results,
            aborted,
            elapsed,
        })
    }

    async fn run_queue(&self, queue: Arc<GraphQueue>) -> TaskResult<()> {
        let inner = &self.inner;
        let parallel = !inner.config.single_threaded && inner.config.threads > 1;
        let semaphore = Arc::new(Semaphore::new(inner.config.threads.max(1)));
        let mut workers: JoinSet<()> = JoinSet::new();
        let total = queue.progress_count();

        while !queue.empty() {
            let Some(unique_id) = queue.get().await else {
                break;
            };
            self.raise_set_error()?;

            let runner = {
                let manifest = lock(&inner.manifest);
                let member = manifest.graph_member(unique_id.as_str()).ok_or_else(|| {
                    CoreError::internal(format!("queued node {unique_id} missing from manifest"))
                })?;
                runner_for(&member, inner.config.mode)?
            };
            let skip_cause = lock(&inner.skipped).remove(&unique_id);
            let ephemeral = queue.is_ephemeral(unique_id.as_str());
            let index = if ephemeral {
                0
            } else {
                inner.progress.fetch_add(1, Ordering::SeqCst) + 1
            };

            if parallel {
                let permit = Arc::clone(&semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| CoreError::internal("worker semaphore closed"))?;
                let inner = Arc::clone(&self.inner);
                let queue = Arc::clone(&queue);
                workers.spawn(async move {
                    let _permit = permit;
                    run_one(inner, queue, runner, skip_cause, ephemeral, index, total).await;
                });
            } else {
                run_one(
                    Arc::clone(&self.inner),
                    Arc::clone(&queue),
                    runner,
                    skip_cause,
                    ephemeral,
                    index,
                    total,
                )
                .await;
            }
        }

        if inner.config.fail_fast {
            // wake on every completion to surface a stashed error without
            // waiting for full quiescence
            while queue.wait_until_something_was_done().await > 0 {
                self.raise_set_error()?;
            }
        } else {
            queue.join().await;
        }
        while workers.join_next().await.is_some() {}
        self.raise_set_error()?;
        Ok(())
    }

    fn raise_set_error(&self) -> TaskResult<()> {
        match lock(&self.inner.raise_next_tick).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn cancel_connections(&self) {
        let inner = &self.inner;
        if !inner.adapter.is_cancelable() {
            log::warn!(
                "The {} adapter does not support query cancellation",
                inner.adapter.adapter_type()
            );
            return;
        }
        for connection in inner.adapter.cancel_open_connections() {
            let ephemeral = lock(&inner.manifest)
                .nodes
                .get(connection.as_str())
                .is_some_and(ManifestNode::is_ephemeral_model);
            if !ephemeral {
                inner.observer.on_cancel_line(&connection);
            }
        }
    }
}

/// Resolve only on a real interrupt; a failed handler registration must not
/// abort the run.
async fn wait_for_interrupt() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {}
        Err(err) => {
            log::warn!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    }
}

fn stash(inner: &Inner, err: RunError) {
    let mut guard = lock(&inner.raise_next_tick);
    if guard.is_none() {
        *guard = Some(err);
    }
}

/// One worker's whole unit of work: run or skip the node, then fire the
/// completion callback.
async fn run_one(
    inner: Arc<Inner>,
    queue: Arc<GraphQueue>,
    runner: Box<dyn NodeRunner>,
    skip: Option<SkipCause>,
    ephemeral: bool,
    index: usize,
    total: usize,
) {
    let (result, compiled_node) = call_runner(&inner, runner, skip, ephemeral, index, total).await;
    if let Err(err) = handle_result(&inner, &queue, result, compiled_node, ephemeral) {
        stash(&inner, err.into());
    }
}

async fn call_runner(
    inner: &Inner,
    runner: Box<dyn NodeRunner>,
    skip: Option<SkipCause>,
    ephemeral: bool,
    index: usize,
    total: usize,
) -> (RunResult, Option<ManifestNode>) {
    let unique_id = runner.unique_id().clone();

    if let Some(cause) = skip {
        match runner.on_skip(Some(&cause)) {
            Ok(result) => {
                if !ephemeral {
                    inner
                        .observer
                        .on_skip_line(&runner.describe(), &result, index, total);
                }
                return (result, None);
            }
            Err(err) => {
                let message = err.to_string();
                stash(inner, err.into());
                let result =
                    RunResult::immediate(unique_id, NodeStatus::RuntimeErr, Some(message));
                return (result, None);
            }
        }
    }

    let started_at = Utc::now();
    let timer = Instant::now();

    let compiled = {
        let manifest = lock(&inner.manifest);
        runner.compile(&manifest, inner.renderer.as_ref())
    };

    let (status, message, adapter_response, failures, node) = match compiled {
        Err(err) => (NodeStatus::Error, Some(err.to_string()), None, None, None),
        Ok(compiled) => {
            if ephemeral {
                // compiled but never executed against the warehouse
                (NodeStatus::Success, None, None, None, compiled.node)
            } else {
                runner.before_execute(inner.observer.as_ref(), index, total);
                let ctx = WorkerContext::new(Arc::clone(&inner.adapter), unique_id.to_string());
                let outcome = runner.execute(&compiled, &ctx).await;
                drop(ctx);
                match outcome {
                    Ok(outcome) => (
                        outcome.status,
                        outcome.message,
                        outcome.adapter_response,
                        outcome.failures,
                        compiled.node,
                    ),
                    Err(err) => (
                        NodeStatus::Error,
                        Some(err.to_string()),
                        None,
                        None,
                        compiled.node,
                    ),
                }
            }
        }
    };

    let result = RunResult {
        unique_id,
        status,
        started_at,
        completed_at: Utc::now(),
        execution_time: timer.elapsed().as_secs_f64(),
        message,
        adapter_response,
        failures,
        skip_cause: None,
    };
    if !ephemeral {
        runner.after_execute(&result, inner.observer.as_ref(), index, total);
    }
    (result, node)
}

/// Completion callback: write the compiled node back, record the result,
/// propagate skips, and only then mark the queue slot done.
fn handle_result(
    inner: &Inner,
    queue: &GraphQueue,
    result: RunResult,
    compiled_node: Option<ManifestNode>,
    ephemeral: bool,
) -> Result<(), CoreError> {
    let unique_id = result.unique_id.clone();

    let outcome = (|| -> Result<(), CoreError> {
        if let Some(node) = compiled_node {
            lock(&inner.manifest).update_node(node)?;
        }

        if result.status.propagates_skip() {
            let cause = SkipCause {
                unique_id: unique_id.clone(),
                ephemeral,
                message: result.message.clone(),
            };
            let mut skipped = lock(&inner.skipped);
            for dependent in inner.graph.get_dependent_nodes(unique_id.as_str())? {
                skipped.entry(dependent).or_insert_with(|| cause.clone());
            }
        }

        if inner.config.fail_fast && result.status.trips_fail_fast() {
            stash(
                inner,
                RunError::FailFast {
                    unique_id: unique_id.to_string(),
                },
            );
        }

        if !ephemeral {
            lock(&inner.results).push(result);
        }
        Ok(())
    })();

    // mark_done must happen even when the callback failed, or the queue
    // would deadlock waiting on this node
    queue.mark_done(unique_id.as_str())?;
    outcome
}

#[cfg(test)]
#[path = "task_test.rs"]
mod tests;
