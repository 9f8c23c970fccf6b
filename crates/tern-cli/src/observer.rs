//! Console status reporting: per-node check/cross lines plus an overall
//! progress bar.

use indicatif::{ProgressBar, ProgressStyle};
use tern_core::results::{NodeStatus, RunResult};
use tern_run::RunObserver;

pub(crate) struct ConsoleObserver {
    bar: ProgressBar,
}

impl ConsoleObserver {
    pub(crate) fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            bar
        };
        Self { bar }
    }
}

impl RunObserver for ConsoleObserver {
    fn on_concurrency_line(&self, threads: usize, node_count: usize) {
        self.bar.set_length(node_count as u64);
        self.bar
            .println(format!("Running {node_count} nodes with {threads} threads"));
    }

    fn on_node_start(&self, description: &str, index: usize, total: usize) {
        self.bar.set_message(format!("{index} of {total} {description}"));
    }

    fn on_node_finish(&self, description: &str, result: &RunResult, index: usize, total: usize) {
        let mark = if result.status.is_failure() {
            '\u{2717}'
        } else {
            '\u{2713}'
        };
        let detail = result.message.as_deref().unwrap_or("");
        self.bar.println(format!(
            "  {} {} of {} {} [{} in {:.2}s] {}",
            mark, index, total, description, result.status, result.execution_time, detail
        ));
        self.bar.inc(1);
    }

    fn on_skip_line(&self, description: &str, result: &RunResult, index: usize, total: usize) {
        let cause = result
            .skip_cause
            .as_ref()
            .map(|id| format!(" (upstream: {id})"))
            .unwrap_or_default();
        self.bar
            .println(format!("  - {index} of {total} SKIP {description}{cause}"));
        self.bar.inc(1);
    }

    fn on_cancel_line(&self, connection: &str) {
        self.bar.println(format!("  CANCEL query on {connection}"));
    }

    fn on_run_end(&self, results: &[RunResult], elapsed: f64) {
        self.bar.finish_and_clear();
        if self.bar.is_hidden() {
            return;
        }
        let count = |status: NodeStatus| results.iter().filter(|r| r.status == status).count();
        let errors = count(NodeStatus::Error) + count(NodeStatus::RuntimeErr);
        println!(
            "\nDone in {:.2}s: pass={} warn={} error={} fail={} skip={} total={}",
            elapsed,
            count(NodeStatus::Success) + count(NodeStatus::Pass),
            count(NodeStatus::Warn),
            errors,
            count(NodeStatus::Fail),
            count(NodeStatus::Skipped),
            results.len()
        );
    }
}
