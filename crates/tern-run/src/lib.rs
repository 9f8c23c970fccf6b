//! tern-run - Execution engine for Tern
//!
//! Drains a graph queue through a bounded worker pool: per-resource-type
//! runners compile (via the tern-compile seam) and execute (via the tern-db
//! seam) one node each, the completion callback writes compiled nodes back
//! into the manifest and propagates skips to dependents of failures, and
//! fail-fast / ctrl-c cancel cooperatively.

pub mod error;
pub mod observer;
pub mod runner;
pub mod task;

pub use error::{RunError, TaskResult};
pub use observer::{NoopObserver, RunObserver};
pub use runner::{
    runner_for, Compiled, ExecuteOutcome, NodeRunner, RunMode, SkipCause, WorkerContext,
};
pub use task::{interpret_results, ExecutionOutcome, RunConfig, RunnableTask};
