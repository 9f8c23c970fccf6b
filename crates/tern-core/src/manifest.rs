//! Manifest types: the shared store of graph member nodes.
//!
//! A [`Manifest`] is the output of the (external) parser: every model, seed,
//! snapshot, test, analysis, operation, source, exposure, metric, and macro
//! in the project, keyed by [`UniqueId`]. The linker builds the dependency
//! graph from it, selectors resolve against it, and the scheduler updates it
//! with compiled nodes as workers finish.

use crate::checksum::compute_checksum;
use crate::error::{CoreError, CoreResult};
use crate::node::{ResourceType, TestKind};
use crate::unique_id::UniqueId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Dependency collections for a graph member.
///
/// `nodes` are edges in the execution DAG; `macros` are template-level
/// dependencies that only matter for `state:modified.macros` comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependsOn {
    #[serde(default)]
    pub nodes: Vec<UniqueId>,
    #[serde(default)]
    pub macros: Vec<UniqueId>,
}

/// Metadata attached to generic test nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMetadata {
    /// The generic test name (`unique`, `not_null`, `relationships`, ...)
    pub name: String,
    /// Generic (schema-generated) or singular (handwritten)
    pub kind: TestKind,
}

/// An executable (or analyzable) resource in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestNode {
    pub unique_id: UniqueId,
    pub name: String,
    pub resource_type: ResourceType,
    pub package_name: String,

    /// Ordered path segments used for hierarchical (fqn) selection.
    pub fqn: Vec<String>,

    /// Path of the file this node was parsed from, relative to the project root.
    pub original_file_path: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Resolved config mapping (inheritance applied by the external parser).
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,

    #[serde(default)]
    pub depends_on: DependsOn,

    #[serde(default)]
    pub raw_sql: String,

    /// SHA-256 of the raw body; computed on demand when the parser omitted it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Compiled SQL, present after the renderer has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled_sql: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_metadata: Option<TestMetadata>,

    /// Column a generic test is attached to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
}

impl ManifestNode {
    /// Create a node with empty defaults for everything but identity.
    pub fn new(
        unique_id: impl Into<String>,
        resource_type: ResourceType,
        package_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let package_name = package_name.into();
        Self {
            unique_id: UniqueId::new(unique_id),
            fqn: vec![package_name.clone(), name.clone()],
            name,
            resource_type,
            package_name,
            original_file_path: String::new(),
            tags: Vec::new(),
            config: serde_json::Map::new(),
            depends_on: DependsOn::default(),
            raw_sql: String::new(),
            checksum: None,
            description: String::new(),
            database: None,
            schema: None,
            alias: None,
            compiled_sql: None,
            test_metadata: None,
            column_name: None,
        }
    }

    /// The `materialized` config value, if set.
    pub fn materialized(&self) -> Option<&str> {
        self.config.get("materialized").and_then(Value::as_str)
    }

    /// Ephemeral models participate in the DAG but are never executed
    /// against the warehouse; dependents inline their compiled SQL as a CTE.
    pub fn is_ephemeral_model(&self) -> bool {
        self.resource_type == ResourceType::Model && self.materialized() == Some("ephemeral")
    }

    /// Descend into the config mapping along dotted path segments.
    pub fn config_value(&self, path: &[String]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut value = self.config.get(first)?;
        for segment in rest {
            value = value.as_object()?.get(segment)?;
        }
        Some(value)
    }

    /// Checksum of the raw body, computing it when the parser left it out.
    pub fn body_checksum(&self) -> String {
        self.checksum
            .clone()
            .unwrap_or_else(|| compute_checksum(&self.raw_sql))
    }

    /// The relation name this node materializes as (`database.schema.alias`).
    pub fn relation_name(&self) -> String {
        let identifier = self.alias.as_deref().unwrap_or(&self.name);
        match (&self.database, &self.schema) {
            (Some(db), Some(schema)) => format!("{}.{}.{}", db, schema, identifier),
            (None, Some(schema)) => format!("{}.{}", schema, identifier),
            _ => identifier.to_string(),
        }
    }

    // State-comparison predicates, used by the `state:` selector method.

    pub fn same_body(&self, old: &ManifestNode) -> bool {
        self.body_checksum() == old.body_checksum()
    }

    pub fn same_config(&self, old: &ManifestNode) -> bool {
        self.config == old.config
    }

    pub fn same_persisted_description(&self, old: &ManifestNode) -> bool {
        self.description == old.description
    }

    pub fn same_database_representation(&self, old: &ManifestNode) -> bool {
        self.database == old.database
            && self.schema == old.schema
            && self.alias == old.alias
            && self.name == old.name
    }

    /// Full content equality against a prior version; `None` means the node
    /// is new, which always counts as changed.
    pub fn same_contents(&self, old: Option<&ManifestNode>) -> bool {
        match old {
            None => false,
            Some(old) => {
                self.same_body(old)
                    && self.same_config(old)
                    && self.same_persisted_description(old)
                    && self.same_database_representation(old)
                    && self.fqn == old.fqn
                    && self.depends_on.nodes == old.depends_on.nodes
            }
        }
    }
}

/// An external source table definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub unique_id: UniqueId,
    /// The source group this table belongs to.
    pub source_name: String,
    /// The table name within the source group.
    pub name: String,
    pub package_name: String,
    pub fqn: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub original_file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Actual table name when different from the logical name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Column holding load timestamps, used by freshness checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaded_at_field: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl SourceDefinition {
    pub fn new(
        unique_id: impl Into<String>,
        package_name: impl Into<String>,
        source_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let package_name = package_name.into();
        let source_name = source_name.into();
        let name = name.into();
        Self {
            unique_id: UniqueId::new(unique_id),
            fqn: vec![package_name.clone(), source_name.clone(), name.clone()],
            source_name,
            name,
            package_name,
            tags: Vec::new(),
            original_file_path: String::new(),
            database: None,
            schema: None,
            identifier: None,
            loaded_at_field: None,
            description: String::new(),
        }
    }

    pub fn same_contents(&self, old: Option<&SourceDefinition>) -> bool {
        match old {
            None => false,
            Some(old) => self == old,
        }
    }
}

/// A downstream exposure of one or more graph members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exposure {
    pub unique_id: UniqueId,
    pub name: String,
    pub package_name: String,
    pub fqn: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub original_file_path: String,
    #[serde(default)]
    pub depends_on: DependsOn,
    #[serde(default)]
    pub description: String,
}

impl Exposure {
    pub fn new(
        unique_id: impl Into<String>,
        package_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let package_name = package_name.into();
        let name = name.into();
        Self {
            unique_id: UniqueId::new(unique_id),
            fqn: vec![package_name.clone(), name.clone()],
            name,
            package_name,
            tags: Vec::new(),
            original_file_path: String::new(),
            depends_on: DependsOn::default(),
            description: String::new(),
        }
    }

    pub fn same_contents(&self, old: Option<&Exposure>) -> bool {
        match old {
            None => false,
            Some(old) => self == old,
        }
    }
}

/// A metric definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub unique_id: UniqueId,
    pub name: String,
    pub package_name: String,
    pub fqn: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub original_file_path: String,
    #[serde(default)]
    pub depends_on: DependsOn,
    #[serde(default)]
    pub description: String,
}

impl Metric {
    pub fn new(
        unique_id: impl Into<String>,
        package_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let package_name = package_name.into();
        let name = name.into();
        Self {
            unique_id: UniqueId::new(unique_id),
            fqn: vec![package_name.clone(), name.clone()],
            name,
            package_name,
            tags: Vec::new(),
            original_file_path: String::new(),
            depends_on: DependsOn::default(),
            description: String::new(),
        }
    }

    pub fn same_contents(&self, old: Option<&Metric>) -> bool {
        match old {
            None => false,
            Some(old) => self == old,
        }
    }
}

/// A template macro. Macros are not graph members; they only matter for
/// `state:modified.macros` comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macro {
    pub unique_id: UniqueId,
    pub name: String,
    pub package_name: String,
    #[serde(default)]
    pub macro_sql: String,
    #[serde(default)]
    pub depends_on_macros: Vec<UniqueId>,
}

/// A borrowed view over any graph member kind, used by selector methods
/// that operate uniformly across node collections.
#[derive(Debug, Clone, Copy)]
pub enum GraphMember<'a> {
    Node(&'a ManifestNode),
    Source(&'a SourceDefinition),
    Exposure(&'a Exposure),
    Metric(&'a Metric),
}

impl<'a> GraphMember<'a> {
    pub fn unique_id(&self) -> &'a UniqueId {
        match self {
            GraphMember::Node(n) => &n.unique_id,
            GraphMember::Source(s) => &s.unique_id,
            GraphMember::Exposure(e) => &e.unique_id,
            GraphMember::Metric(m) => &m.unique_id,
        }
    }

    pub fn package_name(&self) -> &'a str {
        match self {
            GraphMember::Node(n) => &n.package_name,
            GraphMember::Source(s) => &s.package_name,
            GraphMember::Exposure(e) => &e.package_name,
            GraphMember::Metric(m) => &m.package_name,
        }
    }

    pub fn fqn(&self) -> &'a [String] {
        match self {
            GraphMember::Node(n) => &n.fqn,
            GraphMember::Source(s) => &s.fqn,
            GraphMember::Exposure(e) => &e.fqn,
            GraphMember::Metric(m) => &m.fqn,
        }
    }

    pub fn tags(&self) -> &'a [String] {
        match self {
            GraphMember::Node(n) => &n.tags,
            GraphMember::Source(s) => &s.tags,
            GraphMember::Exposure(e) => &e.tags,
            GraphMember::Metric(m) => &m.tags,
        }
    }

    pub fn original_file_path(&self) -> &'a str {
        match self {
            GraphMember::Node(n) => &n.original_file_path,
            GraphMember::Source(s) => &s.original_file_path,
            GraphMember::Exposure(e) => &e.original_file_path,
            GraphMember::Metric(m) => &m.original_file_path,
        }
    }

    pub fn depends_on_nodes(&self) -> &'a [UniqueId] {
        match self {
            GraphMember::Node(n) => &n.depends_on.nodes,
            GraphMember::Source(_) => &[],
            GraphMember::Exposure(e) => &e.depends_on.nodes,
            GraphMember::Metric(m) => &m.depends_on.nodes,
        }
    }

    pub fn depends_on_macros(&self) -> &'a [UniqueId] {
        match self {
            GraphMember::Node(n) => &n.depends_on.macros,
            GraphMember::Source(_) => &[],
            GraphMember::Exposure(e) => &e.depends_on.macros,
            GraphMember::Metric(m) => &m.depends_on.macros,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        match self {
            GraphMember::Node(n) => n.resource_type,
            GraphMember::Source(_) => ResourceType::Source,
            GraphMember::Exposure(_) => ResourceType::Exposure,
            GraphMember::Metric(_) => ResourceType::Metric,
        }
    }
}

/// The shared store of all graph members, keyed by unique id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub project_name: String,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub nodes: HashMap<UniqueId, ManifestNode>,
    #[serde(default)]
    pub sources: HashMap<UniqueId, SourceDefinition>,
    #[serde(default)]
    pub exposures: HashMap<UniqueId, Exposure>,
    #[serde(default)]
    pub metrics: HashMap<UniqueId, Metric>,
    #[serde(default)]
    pub macros: HashMap<UniqueId, Macro>,
}

impl Manifest {
    /// Create an empty manifest.
    pub fn new(project_name: &str) -> Self {
        Self {
            project_name: project_name.to_string(),
            generated_at: Utc::now(),
            nodes: HashMap::new(),
            sources: HashMap::new(),
            exposures: HashMap::new(),
            metrics: HashMap::new(),
            macros: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, node: ManifestNode) {
        self.nodes.insert(node.unique_id.clone(), node);
    }

    pub fn add_source(&mut self, source: SourceDefinition) {
        self.sources.insert(source.unique_id.clone(), source);
    }

    pub fn add_exposure(&mut self, exposure: Exposure) {
        self.exposures.insert(exposure.unique_id.clone(), exposure);
    }

    pub fn add_metric(&mut self, metric: Metric) {
        self.metrics.insert(metric.unique_id.clone(), metric);
    }

    pub fn add_macro(&mut self, mac: Macro) {
        self.macros.insert(mac.unique_id.clone(), mac);
    }

    /// Look up a graph member of any kind.
    pub fn graph_member(&self, unique_id: &str) -> Option<GraphMember<'_>> {
        if let Some(node) = self.nodes.get(unique_id) {
            Some(GraphMember::Node(node))
        } else if let Some(source) = self.sources.get(unique_id) {
            Some(GraphMember::Source(source))
        } else if let Some(exposure) = self.exposures.get(unique_id) {
            Some(GraphMember::Exposure(exposure))
        } else {
            self.metrics.get(unique_id).map(GraphMember::Metric)
        }
    }

    /// Look up a graph member, raising an internal error when absent.
    pub fn expect_member(&self, unique_id: &str) -> CoreResult<GraphMember<'_>> {
        self.graph_member(unique_id).ok_or_else(|| {
            CoreError::internal(format!("manifest is missing expected node {unique_id}"))
        })
    }

    /// Iterate every graph member in the manifest.
    pub fn all_members(&self) -> impl Iterator<Item = GraphMember<'_>> {
        self.nodes
            .values()
            .map(GraphMember::Node)
            .chain(self.sources.values().map(GraphMember::Source))
            .chain(self.exposures.values().map(GraphMember::Exposure))
            .chain(self.metrics.values().map(GraphMember::Metric))
    }

    /// Replace a node by id. Internal error if the id was never present:
    /// the scheduler only writes back nodes it popped from the queue.
    pub fn update_node(&mut self, node: ManifestNode) -> CoreResult<()> {
        if !self.nodes.contains_key(&node.unique_id) {
            return Err(CoreError::internal(format!(
                "update_node for unknown id {}",
                node.unique_id
            )));
        }
        self.nodes.insert(node.unique_id.clone(), node);
        Ok(())
    }

    /// Save the manifest atomically (write-to-temp-then-rename).
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::IoWithPath {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        let temp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));
        std::fs::write(&temp_path, &json).map_err(|e| CoreError::IoWithPath {
            path: temp_path.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&temp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            CoreError::IoWithPath {
                path: path.display().to_string(),
                source: e,
            }
        })?;
        Ok(())
    }

    /// Load a manifest from a JSON file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
#[path = "manifest_test.rs"]
mod tests;
