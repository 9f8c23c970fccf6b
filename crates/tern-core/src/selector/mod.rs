//! Node selection: selector methods, the selection-spec algebra, and the
//! node selector that resolves a spec against the graph.
//!
//! A selection expression like `tag:nightly,package:core stg_orders+` parses
//! into a tree of set operations over criteria; each criterion names a
//! selector method (`tag:`, `fqn:`, `state:`, ...) plus optional graph
//! traversal modifiers (`+`, `@`, bounded depths). The [`NodeSelector`]
//! resolves the tree against the full graph and applies the
//! indirect-selection policy for tests.

mod cli;
mod methods;
mod node_selector;
mod spec;

pub use cli::{
    parse_difference, parse_from_definition, parse_union, SelectorDefinition, SelectorFile,
};
pub use methods::{MethodName, SelectorMethod};
pub use node_selector::NodeSelector;
pub use spec::{IndirectSelection, SelectionCriteria, SelectionSpec, SetOperation};
