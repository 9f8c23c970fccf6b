//! tern-core - Core library for Tern
//!
//! This crate provides the shared manifest types, the dependency graph and
//! linker, the node-selection engine (methods, spec algebra, selector), the
//! concurrency-safe graph queue, run-result types, and previous-state
//! comparison used across all Tern components.

pub mod checksum;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod node;
pub mod queue;
pub mod results;
pub mod selector;
pub mod state;
pub mod unique_id;

pub use checksum::compute_checksum;
pub use error::{CoreError, CoreResult};
pub use graph::{Graph, Linker};
pub use manifest::{
    DependsOn, Exposure, GraphMember, Macro, Manifest, ManifestNode, Metric, SourceDefinition,
    TestMetadata,
};
pub use node::{ResourceType, TestKind};
pub use queue::GraphQueue;
pub use results::{NodeStatus, RunResult, RunResultsArtifact};
pub use selector::{
    parse_difference, parse_from_definition, IndirectSelection, MethodName, NodeSelector,
    SelectionCriteria, SelectionSpec, SelectorFile,
};
pub use state::{FreshnessArtifact, FreshnessResult, PreviousState};
pub use unique_id::UniqueId;
