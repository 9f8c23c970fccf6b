//! Parsing selection expressions from their two outer forms: the flat
//! CLI-style string pair (`--select` / `--exclude`) and the structured
//! union/intersection definitions found in `selectors.yml`.

use crate::error::{CoreError, CoreResult};
use crate::selector::methods::MethodName;
use crate::selector::spec::{
    IndirectSelection, SelectionCriteria, SelectionSpec, SetOperation,
};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

const INTERSECTION_DELIMITER: char = ',';

/// With no `--select`, everything selectable is in scope.
pub const DEFAULT_INCLUDES: &[&str] = &["fqn:*", "source:*", "exposure:*", "metric:*"];

/// Parse space-separated union components, each a comma-separated
/// intersection of criteria: `"a b,c"` becomes `union(a, intersection(b, c))`.
pub fn parse_union(
    components: &[String],
    expect_exists: bool,
    indirect_selection: IndirectSelection,
) -> CoreResult<SelectionSpec> {
    let mut union_components = Vec::new();
    for raw_spec in components.iter().flat_map(|c| c.split_whitespace()) {
        let criteria = raw_spec
            .split(INTERSECTION_DELIMITER)
            .map(|part| {
                SelectionCriteria::from_single_spec(part, indirect_selection)
                    .map(SelectionSpec::Criteria)
            })
            .collect::<CoreResult<Vec<_>>>()?;
        union_components.push(SelectionSpec::Intersection(SetOperation {
            components: criteria,
            expect_exists,
            raw: raw_spec.to_string(),
        }));
    }
    Ok(SelectionSpec::Union(SetOperation {
        components: union_components,
        expect_exists: false,
        raw: components.join(" "),
    }))
}

fn parse_union_from_default(
    raw: Option<&[String]>,
    default: &[&str],
    expect_exists: bool,
    indirect_selection: IndirectSelection,
) -> CoreResult<SelectionSpec> {
    match raw {
        Some(components) => parse_union(components, expect_exists, indirect_selection),
        None => {
            let default: Vec<String> = default.iter().map(|s| s.to_string()).collect();
            parse_union(&default, false, indirect_selection)
        }
    }
}

/// Build the spec for a `--select` / `--exclude` pair. A missing include
/// falls back to selecting everything; a missing exclude subtracts nothing.
pub fn parse_difference(
    include: Option<&[String]>,
    exclude: Option<&[String]>,
    indirect_selection: IndirectSelection,
) -> CoreResult<SelectionSpec> {
    // an explicit include is expected to match something; an exclude that
    // matches nothing just subtracts nothing
    let included = parse_union_from_default(include, DEFAULT_INCLUDES, true, indirect_selection)?;
    // excludes always match eagerly so an excluded model takes its tests out
    let excluded = parse_union_from_default(exclude, &[], false, IndirectSelection::Eager)?;
    let raw = format!(
        "{} --exclude {}",
        included.raw(),
        exclude.map(|e| e.join(" ")).unwrap_or_default()
    );
    Ok(SelectionSpec::Difference(SetOperation {
        components: vec![included, excluded],
        expect_exists: false,
        raw,
    }))
}

/// Parse a structured definition: a bare criteria string, a `union:` or
/// `intersection:` list, or a criteria dict, any of which may carry one
/// `exclude` clause.
pub fn parse_from_definition(
    definition: &Value,
    rootlevel: bool,
    indirect_selection: IndirectSelection,
) -> CoreResult<SelectionSpec> {
    match definition {
        Value::String(raw) => {
            SelectionCriteria::from_single_spec(raw, indirect_selection)
                .map(SelectionSpec::Criteria)
        }
        Value::Object(map) => {
            let has_union = map.contains_key("union");
            let has_intersection = map.contains_key("intersection");
            if (has_union || has_intersection) && rootlevel && map.len() > 1 {
                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                return Err(CoreError::InvalidRootDefinition {
                    reason: format!(
                        "only a single 'union' or 'intersection' key is allowed; found {}",
                        keys.join(", ")
                    ),
                });
            }
            if has_union {
                parse_set_definition(definition, "union", indirect_selection)
            } else if has_intersection {
                parse_set_definition(definition, "intersection", indirect_selection)
            } else {
                parse_dict_definition(map, indirect_selection)
            }
        }
        other => Err(CoreError::InvalidRootDefinition {
            reason: format!("expected union, intersection, str, or dict, found: {other}"),
        }),
    }
}

fn get_list(definition: &Value, key: &str) -> CoreResult<Vec<Value>> {
    let entries = definition
        .get(key)
        .ok_or_else(|| CoreError::internal(format!("expected to find key '{key}'")))?;
    let Value::Array(entries) = entries else {
        return Err(CoreError::InvalidRootDefinition {
            reason: format!("invalid value for key \"{key}\", expected a list"),
        });
    };
    for entry in entries {
        if !matches!(entry, Value::String(_) | Value::Object(_)) {
            return Err(CoreError::InvalidRootDefinition {
                reason: format!("invalid value in key \"{key}\", expected dict or str: {entry}"),
            });
        }
    }
    Ok(entries.clone())
}

/// Split a definition list into include components and at most one parsed
/// exclude clause.
fn parse_include_exclude(
    entries: &[Value],
    indirect_selection: IndirectSelection,
) -> CoreResult<(Vec<SelectionSpec>, Option<SelectionSpec>)> {
    let mut includes = Vec::new();
    let mut exclude: Option<SelectionSpec> = None;
    for entry in entries {
        if entry.get("exclude").is_some() {
            if exclude.is_some() {
                return Err(CoreError::MultipleExcludes);
            }
            exclude = parse_exclusions(entry, indirect_selection)?;
        } else {
            includes.push(parse_from_definition(entry, false, indirect_selection)?);
        }
    }
    Ok((includes, exclude))
}

fn parse_exclusions(
    definition: &Value,
    indirect_selection: IndirectSelection,
) -> CoreResult<Option<SelectionSpec>> {
    let entries = get_list(definition, "exclude")?;
    let mut parsed = entries
        .iter()
        .map(|entry| parse_from_definition(entry, false, indirect_selection))
        .collect::<CoreResult<Vec<_>>>()?;
    Ok(match parsed.len() {
        0 => None,
        1 => Some(parsed.remove(0)),
        _ => Some(SelectionSpec::union(parsed)),
    })
}

fn parse_set_definition(
    definition: &Value,
    key: &str,
    indirect_selection: IndirectSelection,
) -> CoreResult<SelectionSpec> {
    let entries = get_list(definition, key)?;
    let (includes, exclude) = parse_include_exclude(&entries, indirect_selection)?;
    let raw = definition.to_string();
    let base = SetOperation {
        components: includes,
        expect_exists: false,
        raw: raw.clone(),
    };
    let combined = if key == "union" {
        SelectionSpec::Union(base)
    } else {
        SelectionSpec::Intersection(base)
    };
    Ok(match exclude {
        None => combined,
        Some(exclude) => SelectionSpec::Difference(SetOperation {
            components: vec![combined, exclude],
            expect_exists: false,
            raw,
        }),
    })
}

/// A criteria dict: either one `{method: value}` pair or explicit `method`
/// and `value` keys with optional traversal modifiers and an `exclude`.
fn parse_dict_definition(
    map: &serde_json::Map<String, Value>,
    indirect_selection: IndirectSelection,
) -> CoreResult<SelectionSpec> {
    let mut exclude: Option<SelectionSpec> = None;

    let (method_key, value) = if map.len() == 1 {
        let (key, value) = map.iter().next().expect("len checked above");
        (key.clone(), value.clone())
    } else if map.contains_key("method") && map.contains_key("value") {
        if map.get("exclude").is_some() {
            exclude = parse_exclusions(&Value::Object(map.clone()), indirect_selection)?;
        }
        let method = scalar_string(map.get("method").expect("checked above"))?;
        let value = map.get("value").expect("checked above").clone();
        (method, value)
    } else {
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        return Err(CoreError::InvalidRootDefinition {
            reason: format!(
                "expected either one key or \"method\" and \"value\" keys, got: {}",
                keys.join(", ")
            ),
        });
    };

    let criteria = criteria_from_dict(map, &method_key, &value, indirect_selection)?;
    Ok(match exclude {
        None => SelectionSpec::Criteria(criteria),
        Some(exclude) => SelectionSpec::Difference(SetOperation {
            components: vec![SelectionSpec::Criteria(criteria), exclude],
            expect_exists: false,
            raw: Value::Object(map.clone()).to_string(),
        }),
    })
}

fn criteria_from_dict(
    map: &serde_json::Map<String, Value>,
    method_key: &str,
    value: &Value,
    indirect_selection: IndirectSelection,
) -> CoreResult<SelectionCriteria> {
    let value = scalar_string(value)?;
    let raw = format!("{method_key}:{value}");
    let invalid = |reason: String| CoreError::InvalidSelector {
        selector: raw.clone(),
        reason,
    };

    let mut parts = method_key.split('.');
    let name = parts.next().unwrap_or_default();
    let method = MethodName::from_selector(name)
        .ok_or_else(|| invalid(format!("'{name}' is not a valid selector method")))?;
    let method_arguments: Vec<String> = parts.map(String::from).collect();

    let indirect_selection = match map.get("indirect_selection") {
        Some(override_value) => scalar_string(override_value)?
            .parse::<IndirectSelection>()
            .map_err(invalid)?,
        None => indirect_selection,
    };

    let flag = |key: &str| map.get(key).and_then(Value::as_bool).unwrap_or(false);
    let depth = |key: &str| map.get(key).and_then(Value::as_u64).map(|d| d as usize);

    let childrens_parents = flag("childrens_parents");
    let children = flag("children");
    if childrens_parents && children {
        return Err(invalid(
            "'childrens_parents' and 'children' are incompatible".to_string(),
        ));
    }

    Ok(SelectionCriteria {
        raw,
        method,
        method_arguments,
        value,
        childrens_parents,
        parents: flag("parents"),
        parents_depth: depth("parents_depth"),
        children,
        children_depth: depth("children_depth"),
        indirect_selection,
    })
}

fn scalar_string(value: &Value) -> CoreResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(CoreError::InvalidRootDefinition {
            reason: format!("expected a scalar selector value, got: {other}"),
        }),
    }
}

/// One named selector from `selectors.yml`.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default: bool,
    pub definition: Value,
}

impl SelectorDefinition {
    /// Parse this selector's definition at root level.
    pub fn parse(&self, indirect_selection: IndirectSelection) -> CoreResult<SelectionSpec> {
        parse_from_definition(&self.definition, true, indirect_selection)
    }
}

/// The `selectors.yml` file: a list of named, reusable selection specs.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorFile {
    pub selectors: Vec<SelectorDefinition>,
}

impl SelectorFile {
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn get(&self, name: &str) -> Option<&SelectorDefinition> {
        self.selectors.iter().find(|s| s.name == name)
    }

    /// The selector flagged `default: true`, if any.
    pub fn default_selector(&self) -> Option<&SelectorDefinition> {
        self.selectors.iter().find(|s| s.default)
    }
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
