//! Concurrency-safe work queue over a subset graph.
//!
//! Each node moves pending -> ready -> in-progress -> done. A node becomes
//! ready only once every one of its dependencies inside the subset graph is
//! done. `get` hands out ready nodes to workers; `mark_done` records a
//! completion and promotes any dependents whose last dependency just
//! finished. Ephemeral nodes occupy queue slots like any other node but are
//! excluded from progress counts.

use crate::error::{CoreError, CoreResult};
use crate::graph::Graph;
use crate::manifest::Manifest;
use crate::unique_id::UniqueId;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::{mpsc, watch};

#[derive(Debug)]
struct QueueState {
    graph: Graph,
    /// Outstanding dependency count per not-yet-ready node.
    in_degree: HashMap<UniqueId, usize>,
    in_progress: HashSet<UniqueId>,
    done: HashSet<UniqueId>,
    /// Nodes handed out so far (ready or beyond).
    popped: usize,
    total: usize,
}

/// Work queue derived from a selected subgraph.
#[derive(Debug)]
pub struct GraphQueue {
    state: Mutex<QueueState>,
    selected: BTreeSet<UniqueId>,
    ephemeral: HashSet<UniqueId>,
    /// Ready nodes flow through this channel; `None` is the exhaustion
    /// sentinel, re-broadcast by every receiver that sees it.
    ready_tx: mpsc::UnboundedSender<Option<UniqueId>>,
    ready_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Option<UniqueId>>>,
    /// Count of completed nodes, for join / fail-fast polling.
    completions_tx: watch::Sender<usize>,
    /// Completion count observed by the previous poll; completions are
    /// sticky, so a poll never misses one that landed before it started.
    last_polled: Mutex<usize>,
}

impl GraphQueue {
    /// Build a queue from a subset graph. Every node of the graph is
    /// queued; nodes with no in-edges start ready.
    pub fn new(graph: Graph, manifest: &Manifest) -> CoreResult<Self> {
        let selected = graph.node_ids();
        let ephemeral: HashSet<UniqueId> = selected
            .iter()
            .filter(|id| {
                manifest
                    .nodes
                    .get(id.as_str())
                    .is_some_and(|n| n.is_ephemeral_model())
            })
            .cloned()
            .collect();

        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let total = selected.len();
        let (completions_tx, _) = watch::channel(0usize);

        let mut in_degree = HashMap::new();
        for id in &selected {
            let parents = graph.parents_of(id.as_str())?;
            if parents.is_empty() {
                let _ = ready_tx.send(Some(id.clone()));
            } else {
                in_degree.insert(id.clone(), parents.len());
            }
        }
        if total == 0 {
            let _ = ready_tx.send(None);
        }

        Ok(Self {
            state: Mutex::new(QueueState {
                graph,
                in_degree,
                in_progress: HashSet::new(),
                done: HashSet::new(),
                popped: 0,
                total,
            }),
            selected,
            ephemeral,
            ready_tx,
            ready_rx: tokio::sync::Mutex::new(ready_rx),
            completions_tx,
            last_polled: Mutex::new(0),
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// The node ids this queue was built over.
    pub fn get_selected_nodes(&self) -> &BTreeSet<UniqueId> {
        &self.selected
    }

    /// Whether a queued node is an ephemeral model.
    pub fn is_ephemeral(&self, id: &str) -> bool {
        self.ephemeral.contains(id)
    }

    /// Number of nodes that count toward user-visible progress.
    pub fn progress_count(&self) -> usize {
        self.selected.len() - self.ephemeral.len()
    }

    /// Advisory: nothing left to hand out. Used to stop submitting work;
    /// in-flight nodes may still be running.
    pub fn empty(&self) -> bool {
        let state = self.lock_state();
        state.popped == state.total
    }

    /// Pop the next ready node, waiting until one becomes ready. Returns
    /// `None` once every node is done and nothing further will be handed out.
    pub async fn get(&self) -> Option<UniqueId> {
        let mut rx = self.ready_rx.lock().await;
        match rx.recv().await {
            Some(Some(id)) => {
                let mut state = self.lock_state();
                state.popped += 1;
                state.in_progress.insert(id.clone());
                Some(id)
            }
            Some(None) => {
                // Exhausted: put the sentinel back for any other waiter.
                let _ = self.ready_tx.send(None);
                None
            }
            // All senders dropped; only possible at teardown.
            None => None,
        }
    }

    /// Record a completion and promote any dependents whose dependencies
    /// are now all done. Marking an unknown or not-in-progress node is an
    /// internal error.
    pub fn mark_done(&self, id: &str) -> CoreResult<()> {
        let mut state = self.lock_state();

        if !state.in_progress.remove(id) {
            return Err(CoreError::internal(format!(
                "mark_done for node {id} that is not in progress"
            )));
        }
        state.done.insert(UniqueId::new(id));

        for child in state.graph.children_of(id)? {
            let Some(count) = state.in_degree.get_mut(&child) else {
                continue;
            };
            *count -= 1;
            if *count == 0 {
                state.in_degree.remove(&child);
                let _ = self.ready_tx.send(Some(child));
            }
        }

        let completions = state.done.len();
        let total = state.total;
        drop(state);

        self.completions_tx.send_replace(completions);
        if completions == total {
            let _ = self.ready_tx.send(None);
        }
        Ok(())
    }

    /// Wait until every queued node is done.
    pub async fn join(&self) {
        let total = self.lock_state().total;
        let mut rx = self.completions_tx.subscribe();
        // wait_for checks the current value before waiting, so a completion
        // that lands before subscription is not missed
        let _ = rx.wait_for(|completions| *completions == total).await;
    }

    /// Wait until at least one node completes since the previous poll and
    /// return the remaining count. Exists for the fail-fast poll loop,
    /// which must wake on every completion to check for a stashed error
    /// without blocking on full completion.
    pub async fn wait_until_something_was_done(&self) -> usize {
        let total = self.lock_state().total;
        let last = *self.last_polled.lock().unwrap_or_else(|p| p.into_inner());
        if last >= total {
            return 0;
        }
        let mut rx = self.completions_tx.subscribe();
        let completions = match rx.wait_for(|completions| *completions > last).await {
            Ok(guard) => *guard,
            Err(_) => return 0,
        };
        *self.last_polled.lock().unwrap_or_else(|p| p.into_inner()) = completions;
        total - completions
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod tests;
