//! Selector methods: one predicate evaluator per selection dimension.
//!
//! Every method receives the manifest, an optional previous-state snapshot,
//! and the dotted arguments parsed from the criteria (`config.severity` ->
//! arguments `["severity"]`), and answers `search(included, value)` with the
//! matching node ids drawn from the candidate set.

use crate::error::{CoreError, CoreResult};
use crate::manifest::{GraphMember, Manifest, ManifestNode};
use crate::node::{ResourceType, TestKind};
use crate::results::NodeStatus;
use crate::state::PreviousState;
use crate::unique_id::UniqueId;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

const SELECTOR_GLOB: &str = "*";

/// The closed set of selector method names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodName {
    Fqn,
    Tag,
    Source,
    Path,
    Package,
    Config,
    TestName,
    TestType,
    ResourceType,
    State,
    Exposure,
    Metric,
    Result,
    SourceStatus,
}

impl MethodName {
    /// Parse a method name from a selector string. Returns `None` for
    /// unknown names; callers turn that into a descriptive selector error.
    pub fn from_selector(name: &str) -> Option<Self> {
        match name {
            "fqn" => Some(MethodName::Fqn),
            "tag" => Some(MethodName::Tag),
            "source" => Some(MethodName::Source),
            "path" => Some(MethodName::Path),
            "package" => Some(MethodName::Package),
            "config" => Some(MethodName::Config),
            "test_name" => Some(MethodName::TestName),
            "test_type" => Some(MethodName::TestType),
            "resource_type" => Some(MethodName::ResourceType),
            "state" => Some(MethodName::State),
            "exposure" => Some(MethodName::Exposure),
            "metric" => Some(MethodName::Metric),
            "result" => Some(MethodName::Result),
            "source_status" => Some(MethodName::SourceStatus),
            _ => None,
        }
    }
}

impl std::fmt::Display for MethodName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MethodName::Fqn => "fqn",
            MethodName::Tag => "tag",
            MethodName::Source => "source",
            MethodName::Path => "path",
            MethodName::Package => "package",
            MethodName::Config => "config",
            MethodName::TestName => "test_name",
            MethodName::TestType => "test_type",
            MethodName::ResourceType => "resource_type",
            MethodName::State => "state",
            MethodName::Exposure => "exposure",
            MethodName::Metric => "metric",
            MethodName::Result => "result",
            MethodName::SourceStatus => "source_status",
        };
        f.write_str(s)
    }
}

/// Match one selector segment against one fqn segment, with glob support.
fn segment_matches(pattern: &str, segment: &str) -> bool {
    if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
        glob::Pattern::new(pattern)
            .map(|p| p.matches(segment))
            .unwrap_or(false)
    } else {
        pattern == segment
    }
}

/// Match a dotted qualified-name selector against a fully-qualified name.
///
/// The leaf name matches directly; otherwise segments are compared in
/// order, with a bare `*` matching the remainder unconditionally. Dots in
/// fqn segments act as namespace separators.
fn is_selected_node(fqn: &[String], selector: &str) -> bool {
    if fqn.last().is_some_and(|leaf| segment_matches(selector, leaf)) {
        return true;
    }
    let flat: Vec<&str> = fqn.iter().flat_map(|segment| segment.split('.')).collect();
    let parts: Vec<&str> = selector.split('.').collect();
    if flat.len() < parts.len() {
        return false;
    }
    for (i, part) in parts.iter().enumerate() {
        if *part == SELECTOR_GLOB {
            return true;
        }
        if !segment_matches(part, flat[i]) {
            return false;
        }
    }
    true
}

/// A source/exposure/metric selector segment: `*` and absent both wildcard.
fn segment_allows(target: Option<&str>, actual: &str) -> bool {
    match target {
        None => true,
        Some(SELECTOR_GLOB) => true,
        Some(t) => segment_matches(t, actual),
    }
}

/// One selector method bound to a manifest and optional previous state.
pub struct SelectorMethod<'a> {
    manifest: &'a Manifest,
    previous_state: Option<&'a PreviousState>,
    method: MethodName,
    arguments: Vec<String>,
}

impl<'a> SelectorMethod<'a> {
    pub fn new(
        manifest: &'a Manifest,
        previous_state: Option<&'a PreviousState>,
        method: MethodName,
        arguments: Vec<String>,
    ) -> Self {
        Self {
            manifest,
            previous_state,
            method,
            arguments,
        }
    }

    /// Every matching node id within `included`.
    pub fn search(
        &self,
        included: &BTreeSet<UniqueId>,
        value: &str,
    ) -> CoreResult<Vec<UniqueId>> {
        match self.method {
            MethodName::Fqn => Ok(self.search_fqn(included, value)),
            MethodName::Tag => Ok(self.search_tag(included, value)),
            MethodName::Source => self.search_source(included, value),
            MethodName::Path => Ok(self.search_path(included, value)),
            MethodName::Package => Ok(self.search_package(included, value)),
            MethodName::Config => Ok(self.search_config(included, value)),
            MethodName::TestName => Ok(self.search_test_name(included, value)),
            MethodName::TestType => self.search_test_type(included, value),
            MethodName::ResourceType => self.search_resource_type(included, value),
            MethodName::State => self.search_state(included, value),
            MethodName::Exposure => self.search_exposure(included, value),
            MethodName::Metric => self.search_metric(included, value),
            MethodName::Result => self.search_result(included, value),
            MethodName::SourceStatus => self.search_source_status(included, value),
        }
    }

    fn invalid(&self, value: &str, reason: impl Into<String>) -> CoreError {
        CoreError::InvalidSelector {
            selector: format!("{}:{}", self.method, value),
            reason: reason.into(),
        }
    }

    /// Executable nodes from the candidate set.
    fn included_nodes(
        &self,
        included: &'a BTreeSet<UniqueId>,
    ) -> impl Iterator<Item = &'a ManifestNode> + 'a {
        let manifest = self.manifest;
        included
            .iter()
            .filter_map(move |id| manifest.nodes.get(id.as_str()))
    }

    /// Graph members of every kind from the candidate set.
    fn included_members(
        &self,
        included: &'a BTreeSet<UniqueId>,
    ) -> impl Iterator<Item = GraphMember<'a>> + 'a {
        let manifest = self.manifest;
        included
            .iter()
            .filter_map(move |id| manifest.graph_member(id.as_str()))
    }

    fn search_fqn(&self, included: &BTreeSet<UniqueId>, value: &str) -> Vec<UniqueId> {
        self.included_nodes(included)
            .filter(|node| {
                // try the full path, then the path with the package stripped,
                // so selectors work across package boundaries
                is_selected_node(&node.fqn, value)
                    || is_selected_node(node.fqn.get(1..).unwrap_or(&[]), value)
            })
            .map(|node| node.unique_id.clone())
            .collect()
    }

    fn search_tag(&self, included: &BTreeSet<UniqueId>, value: &str) -> Vec<UniqueId> {
        self.included_members(included)
            .filter(|member| member.tags().iter().any(|tag| tag == value))
            .map(|member| member.unique_id().clone())
            .collect()
    }

    fn search_source(
        &self,
        included: &BTreeSet<UniqueId>,
        value: &str,
    ) -> CoreResult<Vec<UniqueId>> {
        let parts: Vec<&str> = value.split('.').collect();
        let (package, source, table) = match parts.as_slice() {
            [source] => (None, *source, None),
            [source, table] => (None, *source, Some(*table)),
            [package, source, table] => (Some(*package), *source, Some(*table)),
            _ => {
                return Err(self.invalid(
                    value,
                    "sources must be of the form `source_name`, \
                     `source_name.table_name`, or `package.source_name.table_name`",
                ))
            }
        };

        Ok(included
            .iter()
            .filter_map(|id| self.manifest.sources.get(id.as_str()))
            .filter(|s| {
                segment_allows(package, &s.package_name)
                    && segment_allows(Some(source), &s.source_name)
                    && segment_allows(table, &s.name)
            })
            .map(|s| s.unique_id.clone())
            .collect())
    }

    fn search_path(&self, included: &BTreeSet<UniqueId>, value: &str) -> Vec<UniqueId> {
        let pattern = glob::Pattern::new(value).ok();
        self.included_members(included)
            .filter(|member| {
                let path = member.original_file_path();
                if path.is_empty() {
                    return false;
                }
                if let Some(pattern) = &pattern {
                    if pattern.matches(path) {
                        return true;
                    }
                    // a pattern matching a parent directory selects
                    // everything underneath it
                    let mut parent = Path::new(path).parent();
                    while let Some(dir) = parent {
                        if pattern.matches(&dir.to_string_lossy()) {
                            return true;
                        }
                        parent = dir.parent();
                    }
                }
                Path::new(path).starts_with(value)
            })
            .map(|member| member.unique_id().clone())
            .collect()
    }

    fn search_package(&self, included: &BTreeSet<UniqueId>, value: &str) -> Vec<UniqueId> {
        self.included_members(included)
            .filter(|member| member.package_name() == value)
            .map(|member| member.unique_id().clone())
            .collect()
    }

    fn search_config(&self, included: &BTreeSet<UniqueId>, value: &str) -> Vec<UniqueId> {
        // test severity comparisons are case-insensitive
        let case_insensitive = self.arguments == ["severity"];
        self.included_nodes(included)
            .filter(|node| {
                node.config_value(&self.arguments)
                    .is_some_and(|config| config_matches(config, value, case_insensitive))
            })
            .map(|node| node.unique_id.clone())
            .collect()
    }

    fn search_test_name(&self, included: &BTreeSet<UniqueId>, value: &str) -> Vec<UniqueId> {
        self.included_nodes(included)
            .filter(|node| {
                node.test_metadata
                    .as_ref()
                    .is_some_and(|meta| meta.name == value)
            })
            .map(|node| node.unique_id.clone())
            .collect()
    }

    fn search_test_type(
        &self,
        included: &BTreeSet<UniqueId>,
        value: &str,
    ) -> CoreResult<Vec<UniqueId>> {
        // 'schema' and 'data' are the legacy spellings
        let kind = match value {
            "generic" | "schema" => TestKind::Generic,
            "singular" | "data" => TestKind::Singular,
            _ => {
                return Err(self.invalid(value, "expected \"generic\" or \"singular\""));
            }
        };
        Ok(self
            .included_nodes(included)
            .filter(|node| node.resource_type == ResourceType::Test)
            .filter(|node| match &node.test_metadata {
                Some(meta) => meta.kind == kind,
                // tests without metadata are handwritten assertions
                None => kind == TestKind::Singular,
            })
            .map(|node| node.unique_id.clone())
            .collect())
    }

    fn search_resource_type(
        &self,
        included: &BTreeSet<UniqueId>,
        value: &str,
    ) -> CoreResult<Vec<UniqueId>> {
        let resource_type = ResourceType::from_selector(value)
            .ok_or_else(|| self.invalid(value, "not a valid resource type"))?;
        Ok(self
            .included_members(included)
            .filter(|member| member.resource_type() == resource_type)
            .map(|member| member.unique_id().clone())
            .collect())
    }

    fn search_exposure(
        &self,
        included: &BTreeSet<UniqueId>,
        value: &str,
    ) -> CoreResult<Vec<UniqueId>> {
        let (package, name) = split_package_name(value).ok_or_else(|| {
            self.invalid(
                value,
                "exposures must be of the form `exposure_name` or `package.exposure_name`",
            )
        })?;
        Ok(included
            .iter()
            .filter_map(|id| self.manifest.exposures.get(id.as_str()))
            .filter(|e| segment_allows(package, &e.package_name) && segment_allows(Some(name), &e.name))
            .map(|e| e.unique_id.clone())
            .collect())
    }

    fn search_metric(
        &self,
        included: &BTreeSet<UniqueId>,
        value: &str,
    ) -> CoreResult<Vec<UniqueId>> {
        let (package, name) = split_package_name(value).ok_or_else(|| {
            self.invalid(
                value,
                "metrics must be of the form `metric_name` or `package.metric_name`",
            )
        })?;
        Ok(included
            .iter()
            .filter_map(|id| self.manifest.metrics.get(id.as_str()))
            .filter(|m| segment_allows(package, &m.package_name) && segment_allows(Some(name), &m.name))
            .map(|m| m.unique_id.clone())
            .collect())
    }

    fn search_state(
        &self,
        included: &BTreeSet<UniqueId>,
        value: &str,
    ) -> CoreResult<Vec<UniqueId>> {
        let old = self
            .previous_state
            .and_then(|state| state.manifest.as_ref())
            .ok_or_else(|| CoreError::MissingPreviousState {
                method: "state".to_string(),
                artifact: "manifest",
            })?;

        let check = StateCheck::parse(value).ok_or_else(|| {
            self.invalid(
                value,
                "expected one of \"new\", \"modified\", \"modified.body\", \
                 \"modified.configs\", \"modified.persisted_descriptions\", \
                 \"modified.relation\", \"modified.macros\"",
            )
        })?;

        let modified_macros = match check {
            StateCheck::Modified | StateCheck::ModifiedMacros => self.modified_macros(old),
            _ => HashSet::new(),
        };

        Ok(self
            .included_members(included)
            .filter(|member| {
                let old_member = old.graph_member(member.unique_id().as_str());
                match check {
                    StateCheck::New => old_member.is_none(),
                    StateCheck::Modified => {
                        !same_contents(*member, old_member)
                            || self.depends_on_modified_macro(*member, &modified_macros)
                    }
                    StateCheck::ModifiedBody => {
                        node_changed(*member, old_member, ManifestNode::same_body)
                    }
                    StateCheck::ModifiedConfigs => {
                        node_changed(*member, old_member, ManifestNode::same_config)
                    }
                    StateCheck::ModifiedPersistedDescriptions => node_changed(
                        *member,
                        old_member,
                        ManifestNode::same_persisted_description,
                    ),
                    StateCheck::ModifiedRelation => node_changed(
                        *member,
                        old_member,
                        ManifestNode::same_database_representation,
                    ),
                    StateCheck::ModifiedMacros => {
                        self.depends_on_modified_macro(*member, &modified_macros)
                    }
                }
            })
            .map(|member| member.unique_id().clone())
            .collect())
    }

    /// Macros that were added, removed, or whose body changed since the
    /// comparison manifest.
    fn modified_macros(&self, old: &Manifest) -> HashSet<UniqueId> {
        let mut modified = HashSet::new();
        for (uid, mac) in &self.manifest.macros {
            match old.macros.get(uid) {
                Some(old_mac) if old_mac.macro_sql == mac.macro_sql => {}
                _ => {
                    modified.insert(uid.clone());
                }
            }
        }
        for uid in old.macros.keys() {
            if !self.manifest.macros.contains_key(uid) {
                modified.insert(uid.clone());
            }
        }
        modified
    }

    /// Whether any macro the member transitively depends on was modified.
    /// The walk carries a visited set so macro dependency cycles terminate.
    fn depends_on_modified_macro(
        &self,
        member: GraphMember<'_>,
        modified: &HashSet<UniqueId>,
    ) -> bool {
        if modified.is_empty() {
            return false;
        }
        let mut visited = HashSet::new();
        let mut stack: Vec<UniqueId> = member.depends_on_macros().to_vec();
        while let Some(uid) = stack.pop() {
            if !visited.insert(uid.clone()) {
                continue;
            }
            if modified.contains(&uid) {
                return true;
            }
            if let Some(mac) = self.manifest.macros.get(&uid) {
                stack.extend(mac.depends_on_macros.iter().cloned());
            }
        }
        false
    }

    fn search_result(
        &self,
        included: &BTreeSet<UniqueId>,
        value: &str,
    ) -> CoreResult<Vec<UniqueId>> {
        let results = self
            .previous_state
            .and_then(|state| state.results.as_ref())
            .ok_or_else(|| CoreError::MissingPreviousState {
                method: "result".to_string(),
                artifact: "run results",
            })?;

        if parse_status(value).is_none() {
            return Err(self.invalid(value, "not a valid run status"));
        }

        let matches: HashSet<&UniqueId> = results
            .results
            .iter()
            .filter(|result| result.status.to_string() == value)
            .map(|result| &result.unique_id)
            .collect();

        Ok(self
            .included_members(included)
            .filter(|member| matches.contains(member.unique_id()))
            .map(|member| member.unique_id().clone())
            .collect())
    }

    fn search_source_status(
        &self,
        included: &BTreeSet<UniqueId>,
        value: &str,
    ) -> CoreResult<Vec<UniqueId>> {
        if value != "fresher" {
            return Err(self.invalid(value, "expected \"fresher\""));
        }
        let previous = self
            .previous_state
            .and_then(|state| state.sources.as_ref())
            .ok_or_else(|| CoreError::MissingPreviousState {
                method: "source_status".to_string(),
                artifact: "freshness results",
            })?;
        let current = self
            .previous_state
            .and_then(|state| state.sources_current.as_ref())
            .ok_or_else(|| CoreError::MissingPreviousState {
                method: "source_status".to_string(),
                artifact: "current freshness results",
            })?;

        let mut errored: HashSet<&UniqueId> = HashSet::new();
        let mut previous_loaded = std::collections::HashMap::new();
        for result in &previous.results {
            match result.max_loaded_at {
                Some(ts) => {
                    previous_loaded.insert(&result.unique_id, ts);
                }
                None => {
                    errored.insert(&result.unique_id);
                }
            }
        }

        let mut matches: HashSet<&UniqueId> = HashSet::new();
        for result in &current.results {
            let Some(loaded_at) = result.max_loaded_at else {
                errored.insert(&result.unique_id);
                continue;
            };
            match previous_loaded.get(&result.unique_id) {
                None => {
                    matches.insert(&result.unique_id);
                }
                Some(previous_at) if loaded_at > *previous_at => {
                    matches.insert(&result.unique_id);
                }
                Some(_) => {}
            }
        }

        Ok(self
            .included_members(included)
            .filter(|member| {
                matches.contains(member.unique_id()) && !errored.contains(member.unique_id())
            })
            .map(|member| member.unique_id().clone())
            .collect())
    }
}

fn split_package_name(value: &str) -> Option<(Option<&str>, &str)> {
    let parts: Vec<&str> = value.split('.').collect();
    match parts.as_slice() {
        [name] => Some((None, *name)),
        [package, name] => Some((Some(*package), *name)),
        _ => None,
    }
}

fn config_matches(config: &Value, selector: &str, case_insensitive: bool) -> bool {
    match config {
        Value::String(s) => {
            if case_insensitive {
                s.eq_ignore_ascii_case(selector)
            } else {
                s == selector
            }
        }
        Value::Bool(b) => b.to_string() == selector.to_lowercase(),
        Value::Number(n) => n.to_string() == selector,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StateCheck {
    New,
    Modified,
    ModifiedBody,
    ModifiedConfigs,
    ModifiedPersistedDescriptions,
    ModifiedRelation,
    ModifiedMacros,
}

impl StateCheck {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(StateCheck::New),
            "modified" => Some(StateCheck::Modified),
            "modified.body" => Some(StateCheck::ModifiedBody),
            "modified.configs" => Some(StateCheck::ModifiedConfigs),
            "modified.persisted_descriptions" => Some(StateCheck::ModifiedPersistedDescriptions),
            "modified.relation" => Some(StateCheck::ModifiedRelation),
            "modified.macros" => Some(StateCheck::ModifiedMacros),
            _ => None,
        }
    }
}

/// Content equality across member kinds. An id whose kind changed between
/// manifests counts as changed.
fn same_contents(new: GraphMember<'_>, old: Option<GraphMember<'_>>) -> bool {
    match (new, old) {
        (_, None) => false,
        (GraphMember::Node(n), Some(GraphMember::Node(o))) => n.same_contents(Some(o)),
        (GraphMember::Source(s), Some(GraphMember::Source(o))) => s.same_contents(Some(o)),
        (GraphMember::Exposure(e), Some(GraphMember::Exposure(o))) => e.same_contents(Some(o)),
        (GraphMember::Metric(m), Some(GraphMember::Metric(o))) => m.same_contents(Some(o)),
        _ => false,
    }
}

/// `modified.<aspect>` comparisons only apply to executable nodes; a node
/// with no prior version counts as changed, other member kinds never match.
fn node_changed(
    new: GraphMember<'_>,
    old: Option<GraphMember<'_>>,
    same: impl Fn(&ManifestNode, &ManifestNode) -> bool,
) -> bool {
    let GraphMember::Node(new_node) = new else {
        return false;
    };
    match old {
        Some(GraphMember::Node(old_node)) => !same(new_node, old_node),
        _ => true,
    }
}

fn parse_status(value: &str) -> Option<NodeStatus> {
    match value {
        "success" => Some(NodeStatus::Success),
        "pass" => Some(NodeStatus::Pass),
        "error" => Some(NodeStatus::Error),
        "fail" => Some(NodeStatus::Fail),
        "warn" => Some(NodeStatus::Warn),
        "skipped" => Some(NodeStatus::Skipped),
        "runtime error" => Some(NodeStatus::RuntimeErr),
        _ => None,
    }
}

#[cfg(test)]
#[path = "methods_test.rs"]
mod tests;
