//! Selection criteria and the set-operation tree they combine into.

use crate::error::{CoreError, CoreResult};
use crate::selector::methods::MethodName;
use crate::unique_id::UniqueId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::OnceLock;

/// Policy for pulling in tests whose dependencies are only partially
/// selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndirectSelection {
    /// Include a test as soon as any of its dependencies is selected.
    Eager,
    /// Include a test only when all of its dependencies are selected.
    Cautious,
    /// Include a test when all of its dependencies are selected or are
    /// ancestors of the selection (they will exist by the time it runs).
    Buildable,
}

impl Default for IndirectSelection {
    fn default() -> Self {
        IndirectSelection::Eager
    }
}

impl FromStr for IndirectSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eager" => Ok(IndirectSelection::Eager),
            "cautious" => Ok(IndirectSelection::Cautious),
            "buildable" => Ok(IndirectSelection::Buildable),
            other => Err(format!(
                "invalid indirect selection '{other}', expected eager, cautious, or buildable"
            )),
        }
    }
}

/// One leaf of a selection expression: a method, a value, and graph
/// traversal modifiers.
///
/// The textual form is `[@][N+]method:value[+N]` where `@` selects the
/// whole neighborhood (childrens' parents), a leading `+` selects
/// ancestors, and a trailing `+` selects descendants, each optionally
/// bounded by a hop count.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionCriteria {
    pub raw: String,
    pub method: MethodName,
    /// Dotted arguments after the method name (`config.severity` ->
    /// method `config`, arguments `["severity"]`).
    pub method_arguments: Vec<String>,
    pub value: String,
    pub childrens_parents: bool,
    pub parents: bool,
    pub parents_depth: Option<usize>,
    pub children: bool,
    pub children_depth: Option<usize>,
    pub indirect_selection: IndirectSelection,
}

fn criteria_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<childrens_parents>@)?(?P<parents>(?P<parents_depth>\d*)\+)?((?P<method>[\w.]+):)?(?P<value>.*?)(?P<children>\+(?P<children_depth>\d*))?$",
        )
        .expect("criteria regex is valid")
    })
}

impl SelectionCriteria {
    /// Parse a single textual criterion.
    pub fn from_single_spec(
        raw: &str,
        indirect_selection: IndirectSelection,
    ) -> CoreResult<SelectionCriteria> {
        let invalid = |reason: &str| CoreError::InvalidSelector {
            selector: raw.to_string(),
            reason: reason.to_string(),
        };

        let captures = criteria_regex()
            .captures(raw)
            .ok_or_else(|| invalid("does not match the selector grammar"))?;

        let childrens_parents = captures.name("childrens_parents").is_some();
        let parents = captures.name("parents").is_some();
        let children = captures.name("children").is_some();
        if childrens_parents && children {
            return Err(invalid("'@' prefix and '+' suffix are incompatible"));
        }

        let parents_depth = parse_depth(captures.name("parents_depth").map(|m| m.as_str()));
        let children_depth = parse_depth(captures.name("children_depth").map(|m| m.as_str()));

        let value = captures
            .name("value")
            .map(|m| m.as_str())
            .unwrap_or_default()
            .to_string();
        if value.is_empty() {
            return Err(invalid("selector value cannot be empty"));
        }

        let (method, method_arguments) = match captures.name("method") {
            Some(m) => {
                let mut parts = m.as_str().split('.');
                let name = parts.next().unwrap_or_default();
                let method = MethodName::from_selector(name).ok_or_else(|| {
                    invalid(&format!("'{name}' is not a valid selector method"))
                })?;
                (method, parts.map(String::from).collect())
            }
            None => (Self::default_method(&value), Vec::new()),
        };

        Ok(SelectionCriteria {
            raw: raw.to_string(),
            method,
            method_arguments,
            value,
            childrens_parents,
            parents,
            parents_depth,
            children,
            children_depth,
            indirect_selection,
        })
    }

    /// Bare values default to fqn selection unless they look like a path.
    fn default_method(value: &str) -> MethodName {
        if value.contains(std::path::MAIN_SEPARATOR) || value.to_lowercase().ends_with(".sql") {
            MethodName::Path
        } else {
            MethodName::Fqn
        }
    }
}

fn parse_depth(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|s| s.parse().ok())
}

/// A node of the selection-spec tree.
#[derive(Debug, Clone)]
pub enum SelectionSpec {
    Criteria(SelectionCriteria),
    Union(SetOperation),
    Intersection(SetOperation),
    Difference(SetOperation),
}

/// The payload shared by union/intersection/difference nodes. For a
/// difference, the first component is the include side and every further
/// component is subtracted from it.
#[derive(Debug, Clone)]
pub struct SetOperation {
    pub components: Vec<SelectionSpec>,
    /// When set, this component resolving to the empty set is an error.
    pub expect_exists: bool,
    /// The raw text this node was parsed from, for diagnostics.
    pub raw: String,
}

impl SelectionSpec {
    pub fn union(components: Vec<SelectionSpec>) -> Self {
        SelectionSpec::Union(SetOperation {
            components,
            expect_exists: false,
            raw: String::new(),
        })
    }

    pub fn intersection(components: Vec<SelectionSpec>) -> Self {
        SelectionSpec::Intersection(SetOperation {
            components,
            expect_exists: false,
            raw: String::new(),
        })
    }

    pub fn difference(components: Vec<SelectionSpec>) -> Self {
        SelectionSpec::Difference(SetOperation {
            components,
            expect_exists: false,
            raw: String::new(),
        })
    }

    /// Combine already-resolved component sets per this node's operator.
    pub fn combine(&self, sets: Vec<BTreeSet<UniqueId>>) -> BTreeSet<UniqueId> {
        let mut iter = sets.into_iter();
        let Some(first) = iter.next() else {
            return BTreeSet::new();
        };
        match self {
            SelectionSpec::Criteria(_) | SelectionSpec::Union(_) => {
                iter.fold(first, |mut acc, set| {
                    acc.extend(set);
                    acc
                })
            }
            SelectionSpec::Intersection(_) => {
                iter.fold(first, |acc, set| acc.intersection(&set).cloned().collect())
            }
            SelectionSpec::Difference(_) => {
                iter.fold(first, |acc, set| acc.difference(&set).cloned().collect())
            }
        }
    }

    pub fn expect_exists(&self) -> bool {
        match self {
            SelectionSpec::Criteria(_) => false,
            SelectionSpec::Union(op)
            | SelectionSpec::Intersection(op)
            | SelectionSpec::Difference(op) => op.expect_exists,
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            SelectionSpec::Criteria(c) => &c.raw,
            SelectionSpec::Union(op)
            | SelectionSpec::Intersection(op)
            | SelectionSpec::Difference(op) => &op.raw,
        }
    }
}

#[cfg(test)]
#[path = "spec_test.rs"]
mod tests;
