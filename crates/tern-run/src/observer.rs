//! Status reporting seam.
//!
//! The scheduler and runners report progress through a [`RunObserver`]
//! passed in explicitly; there is no global reporting state. Tests use the
//! no-op implementation, the CLI installs a console observer.

use tern_core::results::RunResult;

/// Receives run lifecycle events from the scheduler.
pub trait RunObserver: Send + Sync {
    /// The run is starting: worker count and number of progress-counted nodes.
    fn on_concurrency_line(&self, _threads: usize, _node_count: usize) {}

    /// A node is about to execute.
    fn on_node_start(&self, _description: &str, _index: usize, _total: usize) {}

    /// A node finished executing.
    fn on_node_finish(&self, _description: &str, _result: &RunResult, _index: usize, _total: usize) {
    }

    /// A node was skipped because of an upstream failure.
    fn on_skip_line(&self, _description: &str, _result: &RunResult, _index: usize, _total: usize) {}

    /// An in-flight query was asked to cancel.
    fn on_cancel_line(&self, _connection: &str) {}

    /// The run is over; results are final.
    fn on_run_end(&self, _results: &[RunResult], _elapsed: f64) {}
}

/// Observer that reports nothing.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}
