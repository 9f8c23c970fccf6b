//! Resource types for graph member nodes.
//!
//! Every vertex in the dependency DAG carries a [`ResourceType`] tag. The
//! enum is closed: selector strings that do not name a variant are a hard
//! error at parse time, never a silent no-match.

use serde::{Deserialize, Serialize};

/// Canonical resource type for all graph members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// SQL transformation model
    Model,
    /// Standalone analysis query, compiled but never materialized
    Analysis,
    /// Schema or singular data test
    Test,
    /// Type-2 history snapshot
    Snapshot,
    /// Hook operation (on-run-start / on-run-end)
    Operation,
    /// CSV seed data
    Seed,
    /// Documentation block
    #[serde(rename = "docs")]
    Documentation,
    /// External data source table
    Source,
    /// Reusable template macro (not part of the execution DAG)
    Macro,
    /// Downstream exposure of one or more models
    Exposure,
    /// Metric definition
    Metric,
}

impl ResourceType {
    /// Resource types that can be submitted to a runner.
    pub fn executable() -> &'static [ResourceType] {
        &[
            ResourceType::Model,
            ResourceType::Test,
            ResourceType::Snapshot,
            ResourceType::Analysis,
            ResourceType::Operation,
            ResourceType::Seed,
            ResourceType::Documentation,
        ]
    }

    /// Resource types that other nodes may reference as a relation.
    pub fn refable() -> &'static [ResourceType] {
        &[
            ResourceType::Model,
            ResourceType::Seed,
            ResourceType::Snapshot,
        ]
    }

    /// Parse a selector value into a resource type.
    ///
    /// Returns `None` for unknown strings; callers turn that into a
    /// descriptive selector error.
    pub fn from_selector(value: &str) -> Option<Self> {
        match value {
            "model" => Some(ResourceType::Model),
            "analysis" => Some(ResourceType::Analysis),
            "test" => Some(ResourceType::Test),
            "snapshot" => Some(ResourceType::Snapshot),
            "operation" => Some(ResourceType::Operation),
            "seed" => Some(ResourceType::Seed),
            "docs" => Some(ResourceType::Documentation),
            "source" => Some(ResourceType::Source),
            "macro" => Some(ResourceType::Macro),
            "exposure" => Some(ResourceType::Exposure),
            "metric" => Some(ResourceType::Metric),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceType::Model => "model",
            ResourceType::Analysis => "analysis",
            ResourceType::Test => "test",
            ResourceType::Snapshot => "snapshot",
            ResourceType::Operation => "operation",
            ResourceType::Seed => "seed",
            ResourceType::Documentation => "docs",
            ResourceType::Source => "source",
            ResourceType::Macro => "macro",
            ResourceType::Exposure => "exposure",
            ResourceType::Metric => "metric",
        };
        f.write_str(s)
    }
}

/// Kind of a test node: schema-generated or handwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    /// Generated from a schema definition (`unique`, `not_null`, ...)
    Generic,
    /// A handwritten SQL assertion
    Singular,
}
