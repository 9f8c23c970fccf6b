//! The dependency DAG and the linker that builds it from a manifest.
//!
//! Edges point dependency -> dependent ("data flows from parent to child"),
//! so a topological walk yields dependencies first. Construction rejects
//! cycles, reporting the cycle as an ordered path for diagnostics.

use crate::error::{CoreError, CoreResult};
use crate::manifest::Manifest;
use crate::unique_id::UniqueId;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// A directed acyclic graph over node identifiers.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    graph: DiGraph<UniqueId, ()>,
    node_map: HashMap<UniqueId, NodeIndex>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning its index. Adding an existing node is a no-op.
    pub fn add_node(&mut self, id: UniqueId) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(&id) {
            idx
        } else {
            let idx = self.graph.add_node(id.clone());
            self.node_map.insert(id, idx);
            idx
        }
    }

    /// Add a dependency edge from `dependency` to `dependent`.
    pub fn add_edge(&mut self, dependency: UniqueId, dependent: UniqueId) {
        let dep_idx = self.add_node(dependency);
        let child_idx = self.add_node(dependent);
        self.graph.update_edge(dep_idx, child_idx, ());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node_map.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// All node ids, in deterministic order.
    pub fn node_ids(&self) -> BTreeSet<UniqueId> {
        self.node_map.keys().cloned().collect()
    }

    fn index_of(&self, id: &str) -> CoreResult<NodeIndex> {
        self.node_map
            .get(id)
            .copied()
            .ok_or_else(|| CoreError::internal(format!("node {id} not found in the graph")))
    }

    /// Direct dependencies of a node within this graph.
    pub fn parents_of(&self, id: &str) -> CoreResult<BTreeSet<UniqueId>> {
        let idx = self.index_of(id)?;
        Ok(self.neighbor_ids(idx, Direction::Incoming))
    }

    /// Direct dependents of a node within this graph.
    pub fn children_of(&self, id: &str) -> CoreResult<BTreeSet<UniqueId>> {
        let idx = self.index_of(id)?;
        Ok(self.neighbor_ids(idx, Direction::Outgoing))
    }

    fn neighbor_ids(&self, idx: NodeIndex, direction: Direction) -> BTreeSet<UniqueId> {
        self.graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// All nodes with a path to `node`, excluding `node` itself, bounded to
    /// `max_depth` hops when given.
    pub fn ancestors(&self, node: &str, max_depth: Option<usize>) -> CoreResult<BTreeSet<UniqueId>> {
        self.reachable(node, Direction::Incoming, max_depth)
    }

    /// All nodes reachable from `node`, excluding `node` itself, bounded to
    /// `max_depth` hops when given.
    pub fn descendants(
        &self,
        node: &str,
        max_depth: Option<usize>,
    ) -> CoreResult<BTreeSet<UniqueId>> {
        self.reachable(node, Direction::Outgoing, max_depth)
    }

    /// BFS from `node` in `direction`, collecting everything within
    /// `max_depth` hops (unbounded when `None`).
    fn reachable(
        &self,
        node: &str,
        direction: Direction,
        max_depth: Option<usize>,
    ) -> CoreResult<BTreeSet<UniqueId>> {
        let start = self.index_of(node)?;

        let mut result = BTreeSet::new();
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut queue = VecDeque::new();
        queue.push_back((start, 0usize));

        while let Some((current, depth)) = queue.pop_front() {
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            for neighbor in self.graph.neighbors_directed(current, direction) {
                if visited.insert(neighbor) {
                    result.insert(self.graph[neighbor].clone());
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }

        Ok(result)
    }

    /// Union of ancestors over a set of seed nodes.
    pub fn select_parents(
        &self,
        selected: &BTreeSet<UniqueId>,
        max_depth: Option<usize>,
    ) -> CoreResult<BTreeSet<UniqueId>> {
        let mut result = BTreeSet::new();
        for node in selected {
            result.extend(self.ancestors(node.as_str(), max_depth)?);
        }
        Ok(result)
    }

    /// Union of descendants over a set of seed nodes.
    pub fn select_children(
        &self,
        selected: &BTreeSet<UniqueId>,
        max_depth: Option<usize>,
    ) -> CoreResult<BTreeSet<UniqueId>> {
        let mut result = BTreeSet::new();
        for node in selected {
            result.extend(self.descendants(node.as_str(), max_depth)?);
        }
        Ok(result)
    }

    /// The "@" neighborhood: children of the selection, plus every ancestor
    /// of the selection and of those children.
    pub fn select_childrens_parents(
        &self,
        selected: &BTreeSet<UniqueId>,
    ) -> CoreResult<BTreeSet<UniqueId>> {
        let mut ancestors_for = self.select_children(selected, None)?;
        ancestors_for.extend(selected.iter().cloned());
        let mut result = self.select_parents(&ancestors_for, None)?;
        result.extend(ancestors_for);
        Ok(result)
    }

    /// All transitive descendants of `node`; used for skip propagation.
    pub fn get_dependent_nodes(&self, node: &str) -> CoreResult<BTreeSet<UniqueId>> {
        self.descendants(node, None)
    }

    /// Produce a new graph containing only `selected` nodes. Every removed
    /// node has its in-edges rewired directly to its out-edges so that
    /// transitive reachability between kept nodes is preserved; self-loops
    /// introduced by the rewiring are dropped.
    pub fn get_subset_graph(&self, selected: &BTreeSet<UniqueId>) -> CoreResult<Graph> {
        let mut new_graph = self.clone();

        for id in self.node_map.keys() {
            if selected.contains(id) {
                continue;
            }
            let idx = new_graph.index_of(id.as_str())?;
            let sources: Vec<NodeIndex> = new_graph
                .graph
                .edges_directed(idx, Direction::Incoming)
                .map(|e| e.source())
                .collect();
            let targets: Vec<NodeIndex> = new_graph
                .graph
                .edges_directed(idx, Direction::Outgoing)
                .map(|e| e.target())
                .collect();

            for &source in &sources {
                for &target in &targets {
                    if source != target {
                        new_graph.graph.update_edge(source, target, ());
                    }
                }
            }

            // remove_node swaps indices around, so rebuild the map after
            new_graph.graph.remove_node(idx);
            new_graph.rebuild_node_map();
        }

        for id in selected {
            if !new_graph.contains(id.as_str()) {
                return Err(CoreError::NodeNotInGraph {
                    node: id.to_string(),
                });
            }
        }

        Ok(new_graph)
    }

    fn rebuild_node_map(&mut self) {
        self.node_map = self
            .graph
            .node_indices()
            .map(|idx| (self.graph[idx].clone(), idx))
            .collect();
    }

    /// Check the graph for cycles, reporting one as an ordered path.
    pub fn find_cycles(&self) -> Option<String> {
        match toposort(&self.graph, None) {
            Ok(_) => None,
            Err(cycle) => Some(self.cycle_path(cycle.node_id())),
        }
    }

    /// Walk forward from a node known to sit on a cycle until it repeats.
    fn cycle_path(&self, start: NodeIndex) -> String {
        let mut path = vec![self.graph[start].to_string()];
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut current = start;

        while let Some(edge) = self.graph.edges(current).next() {
            let target = edge.target();
            path.push(self.graph[target].to_string());
            if !visited.insert(target) {
                break;
            }
            current = target;
        }

        path.join(" --> ")
    }

    /// Pairs of `(dependency, dependent)` edges, used to seed the queue.
    pub fn edges(&self) -> Vec<(UniqueId, UniqueId)> {
        self.graph
            .edge_references()
            .map(|e| {
                (
                    self.graph[e.source()].clone(),
                    self.graph[e.target()].clone(),
                )
            })
            .collect()
    }
}

/// Builds the dependency graph from a manifest.
///
/// Every graph member becomes a vertex; every `depends_on.nodes` entry
/// becomes an edge. A dependency id that resolves to nothing in the
/// manifest is a hard error, as is any cycle.
#[derive(Debug, Default)]
pub struct Linker {
    graph: Graph,
}

impl Linker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link every member of the manifest and return the validated graph.
    pub fn link_graph(mut self, manifest: &Manifest) -> CoreResult<Graph> {
        for member in manifest.all_members() {
            self.graph.add_node(member.unique_id().clone());
        }
        for member in manifest.all_members() {
            for dependency in member.depends_on_nodes() {
                if manifest.graph_member(dependency.as_str()).is_none() {
                    return Err(CoreError::DependencyNotFound {
                        node: member.unique_id().to_string(),
                        dependency: dependency.to_string(),
                    });
                }
                self.graph
                    .add_edge(dependency.clone(), member.unique_id().clone());
            }
        }

        if let Some(cycle) = self.graph.find_cycles() {
            return Err(CoreError::CircularDependency { cycle });
        }

        Ok(self.graph)
    }
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod tests;
