//! The node selector: resolves a selection spec against the graph.
//!
//! Resolution carries two sets through the spec tree: the *direct* set a
//! criterion matched (plus its graph neighborhood), and an *indirect* set of
//! tests that depend on the selection but whose full dependency set was not
//! admitted by the indirect-selection policy. Indirect tests are re-examined
//! after every set combination and promoted once all of their dependencies
//! land in the combined direct set.

use crate::error::{CoreError, CoreResult};
use crate::graph::Graph;
use crate::manifest::Manifest;
use crate::node::ResourceType;
use crate::queue::GraphQueue;
use crate::selector::methods::SelectorMethod;
use crate::selector::spec::{IndirectSelection, SelectionCriteria, SelectionSpec};
use crate::state::PreviousState;
use crate::unique_id::UniqueId;
use std::collections::BTreeSet;

/// Resolves selection specs into concrete node-id sets and graph queues.
pub struct NodeSelector<'a> {
    graph: &'a Graph,
    manifest: &'a Manifest,
    previous_state: Option<&'a PreviousState>,
    /// When set, the final selection keeps only these resource types; a
    /// model-run task passes `[Model]`, a build task passes everything
    /// executable.
    resource_types: Option<Vec<ResourceType>>,
}

impl<'a> NodeSelector<'a> {
    pub fn new(
        graph: &'a Graph,
        manifest: &'a Manifest,
        previous_state: Option<&'a PreviousState>,
    ) -> Self {
        Self {
            graph,
            manifest,
            previous_state,
            resource_types: None,
        }
    }

    /// Restrict the final selection to the given resource types.
    pub fn with_resource_types(mut self, resource_types: Vec<ResourceType>) -> Self {
        self.resource_types = Some(resource_types);
        self
    }

    /// Resolve a spec to the node ids the task should operate on.
    pub fn get_selected(&self, spec: &SelectionSpec) -> CoreResult<BTreeSet<UniqueId>> {
        let (selected, _indirect_only) = self.select_nodes(spec)?;
        Ok(self.filter_selection(selected))
    }

    /// Resolve a spec and build the execution queue over its subset graph,
    /// so ordering still respects edges between selected nodes even though
    /// unselected intermediaries were removed.
    pub fn get_graph_queue(&self, spec: &SelectionSpec) -> CoreResult<GraphQueue> {
        let selected = self.get_selected(spec)?;
        let subgraph = self.graph.get_subset_graph(&selected)?;
        GraphQueue::new(subgraph, self.manifest)
    }

    /// Resolve the spec tree, returning the selected set and the tests that
    /// stayed indirect all the way up.
    pub fn select_nodes(
        &self,
        spec: &SelectionSpec,
    ) -> CoreResult<(BTreeSet<UniqueId>, BTreeSet<UniqueId>)> {
        let (direct, indirect) = self.select_nodes_recursively(spec)?;
        let indirect_only = indirect.difference(&direct).cloned().collect();
        Ok((direct, indirect_only))
    }

    fn select_nodes_recursively(
        &self,
        spec: &SelectionSpec,
    ) -> CoreResult<(BTreeSet<UniqueId>, BTreeSet<UniqueId>)> {
        let components = match spec {
            SelectionSpec::Criteria(criteria) => {
                return self.get_nodes_from_criteria(criteria);
            }
            SelectionSpec::Union(op)
            | SelectionSpec::Intersection(op)
            | SelectionSpec::Difference(op) => &op.components,
        };

        let mut direct_sets = Vec::with_capacity(components.len());
        let mut indirect_sets = Vec::with_capacity(components.len());
        for component in components {
            let (direct, indirect) = self.select_nodes_recursively(component)?;
            direct_sets.push(direct);
            indirect_sets.push(indirect);
        }

        let initial_direct = spec.combine(direct_sets);
        let indirect = spec.combine(indirect_sets);
        let direct = self.incorporate_indirect_nodes(initial_direct, &indirect);

        if spec.expect_exists() && direct.is_empty() {
            return Err(CoreError::NoNodesForSelection {
                selector: spec.raw().to_string(),
            });
        }

        Ok((direct, indirect))
    }

    /// Resolve one criterion: method search over the full node universe,
    /// then graph-neighborhood expansion, then the indirect-selection split.
    fn get_nodes_from_criteria(
        &self,
        criteria: &SelectionCriteria,
    ) -> CoreResult<(BTreeSet<UniqueId>, BTreeSet<UniqueId>)> {
        let universe = self.graph.node_ids();
        let collected = self.select_included(&universe, criteria)?;
        let neighbors = self.collect_specified_neighbors(criteria, &collected)?;

        let mut selected = collected;
        selected.extend(neighbors);

        self.expand_selection(&selected, criteria.indirect_selection)
    }

    fn select_included(
        &self,
        included: &BTreeSet<UniqueId>,
        criteria: &SelectionCriteria,
    ) -> CoreResult<BTreeSet<UniqueId>> {
        let method = SelectorMethod::new(
            self.manifest,
            self.previous_state,
            criteria.method,
            criteria.method_arguments.clone(),
        );
        Ok(method.search(included, &criteria.value)?.into_iter().collect())
    }

    /// The graph neighborhood the criterion's modifiers ask for.
    fn collect_specified_neighbors(
        &self,
        criteria: &SelectionCriteria,
        selected: &BTreeSet<UniqueId>,
    ) -> CoreResult<BTreeSet<UniqueId>> {
        let mut additional = BTreeSet::new();
        if criteria.childrens_parents {
            additional.extend(self.graph.select_childrens_parents(selected)?);
        }
        if criteria.parents {
            additional.extend(self.graph.select_parents(selected, criteria.parents_depth)?);
        }
        if criteria.children {
            additional.extend(self.graph.select_children(selected, criteria.children_depth)?);
        }
        Ok(additional)
    }

    /// Split downstream tests of the selection into directly-included and
    /// indirect, per the policy.
    fn expand_selection(
        &self,
        selected: &BTreeSet<UniqueId>,
        indirect_selection: IndirectSelection,
    ) -> CoreResult<(BTreeSet<UniqueId>, BTreeSet<UniqueId>)> {
        let mut direct = selected.clone();
        let mut indirect = BTreeSet::new();

        // buildable admits dependencies that will already exist by run time
        let buildable_universe = match indirect_selection {
            IndirectSelection::Buildable => {
                let mut universe = self.graph.select_parents(selected, None)?;
                universe.extend(selected.iter().cloned());
                universe
            }
            _ => BTreeSet::new(),
        };

        let mut successors = BTreeSet::new();
        for id in selected {
            successors.extend(self.graph.children_of(id.as_str())?);
        }

        for unique_id in successors.difference(selected) {
            let Some(node) = self.manifest.nodes.get(unique_id.as_str()) else {
                continue;
            };
            if node.resource_type != ResourceType::Test {
                continue;
            }

            let fully_selected = match indirect_selection {
                IndirectSelection::Eager => true,
                IndirectSelection::Cautious => node
                    .depends_on
                    .nodes
                    .iter()
                    .all(|dep| selected.contains(dep)),
                IndirectSelection::Buildable => node
                    .depends_on
                    .nodes
                    .iter()
                    .filter(|dep| {
                        self.manifest
                            .nodes
                            .get(dep.as_str())
                            .map_or(true, |n| n.resource_type != ResourceType::Test)
                    })
                    .all(|dep| buildable_universe.contains(dep)),
            };

            if fully_selected {
                direct.insert(unique_id.clone());
            } else {
                indirect.insert(unique_id.clone());
            }
        }

        Ok((direct, indirect))
    }

    /// Promote indirect tests whose dependencies are all in the combined
    /// direct set.
    fn incorporate_indirect_nodes(
        &self,
        direct: BTreeSet<UniqueId>,
        indirect: &BTreeSet<UniqueId>,
    ) -> BTreeSet<UniqueId> {
        if indirect.is_empty() {
            return direct;
        }
        let mut selected = direct;
        for unique_id in indirect {
            if let Some(node) = self.manifest.nodes.get(unique_id.as_str()) {
                if node
                    .depends_on
                    .nodes
                    .iter()
                    .all(|dep| selected.contains(dep))
                {
                    selected.insert(unique_id.clone());
                }
            }
        }
        selected
    }

    /// Drop selected ids the task does not care about.
    fn filter_selection(&self, selected: BTreeSet<UniqueId>) -> BTreeSet<UniqueId> {
        selected
            .into_iter()
            .filter(|id| {
                let Some(member) = self.manifest.graph_member(id.as_str()) else {
                    return false;
                };
                match &self.resource_types {
                    Some(types) => types.contains(&member.resource_type()),
                    None => true,
                }
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "node_selector_test.rs"]
mod tests;
