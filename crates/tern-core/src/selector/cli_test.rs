use super::*;
use serde_json::json;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn criteria(spec: &SelectionSpec) -> &SelectionCriteria {
    match spec {
        SelectionSpec::Criteria(c) => c,
        other => panic!("expected criteria, got {other:?}"),
    }
}

fn components(spec: &SelectionSpec) -> &[SelectionSpec] {
    match spec {
        SelectionSpec::Union(op)
        | SelectionSpec::Intersection(op)
        | SelectionSpec::Difference(op) => &op.components,
        other => panic!("expected a set operation, got {other:?}"),
    }
}

#[test]
fn test_parse_union_splits_spaces_and_commas() {
    let spec = parse_union(
        &strings(&["tag:nightly,package:core stg_orders"]),
        true,
        IndirectSelection::Eager,
    )
    .unwrap();

    let unions = components(&spec);
    assert_eq!(unions.len(), 2);

    // first component: intersection of two criteria
    let first = components(&unions[0]);
    assert_eq!(first.len(), 2);
    assert_eq!(criteria(&first[0]).method, MethodName::Tag);
    assert_eq!(criteria(&first[0]).value, "nightly");
    assert_eq!(criteria(&first[1]).method, MethodName::Package);
    assert_eq!(criteria(&first[1]).value, "core");
    assert!(unions[0].expect_exists());
    assert_eq!(unions[0].raw(), "tag:nightly,package:core");

    let second = components(&unions[1]);
    assert_eq!(second.len(), 1);
    assert_eq!(criteria(&second[0]).method, MethodName::Fqn);
}

#[test]
fn test_parse_difference_defaults_select_everything() {
    let spec = parse_difference(None, None, IndirectSelection::Eager).unwrap();
    let parts = components(&spec);
    assert_eq!(parts.len(), 2);

    // the default include union must not require matches
    let includes = components(&parts[0]);
    assert_eq!(includes.len(), DEFAULT_INCLUDES.len());
    assert!(includes.iter().all(|i| !i.expect_exists()));

    // the default exclude union is empty
    assert!(components(&parts[1]).is_empty());
}

#[test]
fn test_parse_difference_explicit_include_expects_matches() {
    let spec = parse_difference(
        Some(&strings(&["stg_orders"])),
        Some(&strings(&["tag:deprecated"])),
        IndirectSelection::Eager,
    )
    .unwrap();
    let parts = components(&spec);
    let includes = components(&parts[0]);
    assert!(includes.iter().all(|i| i.expect_exists()));
    let excludes = components(&parts[1]);
    assert!(excludes.iter().all(|e| !e.expect_exists()));
}

#[test]
fn test_parse_definition_string() {
    let spec =
        parse_from_definition(&json!("2+stg_orders+"), true, IndirectSelection::Eager).unwrap();
    let c = criteria(&spec);
    assert!(c.parents);
    assert_eq!(c.parents_depth, Some(2));
    assert!(c.children);
}

#[test]
fn test_parse_definition_single_key_dict() {
    let spec =
        parse_from_definition(&json!({"tag": "nightly"}), true, IndirectSelection::Eager).unwrap();
    let c = criteria(&spec);
    assert_eq!(c.method, MethodName::Tag);
    assert_eq!(c.value, "nightly");
}

#[test]
fn test_parse_definition_method_value_with_modifiers() {
    let spec = parse_from_definition(
        &json!({
            "method": "config.materialized",
            "value": "view",
            "parents": true,
            "children_depth": 3,
            "children": true,
            "indirect_selection": "cautious",
        }),
        true,
        IndirectSelection::Eager,
    )
    .unwrap();
    let c = criteria(&spec);
    assert_eq!(c.method, MethodName::Config);
    assert_eq!(c.method_arguments, vec!["materialized"]);
    assert!(c.parents);
    assert!(c.children);
    assert_eq!(c.children_depth, Some(3));
    assert_eq!(c.indirect_selection, IndirectSelection::Cautious);
}

#[test]
fn test_parse_union_definition_with_exclude() {
    let spec = parse_from_definition(
        &json!({"union": [
            {"method": "fqn", "value": "stg_*"},
            {"exclude": [{"method": "tag", "value": "deprecated"}]},
        ]}),
        true,
        IndirectSelection::Eager,
    )
    .unwrap();

    // exclude lifts the union into a difference
    let SelectionSpec::Difference(op) = &spec else {
        panic!("expected difference, got {spec:?}");
    };
    assert_eq!(op.components.len(), 2);
    assert!(matches!(op.components[0], SelectionSpec::Union(_)));
    assert_eq!(criteria(&op.components[1]).method, MethodName::Tag);
}

#[test]
fn test_multiple_excludes_at_one_level_is_error() {
    let err = parse_from_definition(
        &json!({"union": [
            {"method": "fqn", "value": "a"},
            {"exclude": ["b"]},
            {"exclude": ["c"]},
        ]}),
        true,
        IndirectSelection::Eager,
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::MultipleExcludes));
}

#[test]
fn test_root_level_union_with_extra_keys_is_error() {
    let err = parse_from_definition(
        &json!({"union": ["a"], "intersection": ["b"]}),
        true,
        IndirectSelection::Eager,
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::InvalidRootDefinition { .. }));

    // nested definitions may combine with other keys
    let ok = parse_from_definition(
        &json!({"intersection": [{"union": ["a", "b"]}, "tag:nightly"]}),
        true,
        IndirectSelection::Eager,
    );
    assert!(ok.is_ok());
}

#[test]
fn test_non_list_union_value_is_error() {
    let err = parse_from_definition(
        &json!({"union": "stg_orders"}),
        true,
        IndirectSelection::Eager,
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::InvalidRootDefinition { .. }));
}

#[test]
fn test_selector_file_roundtrip() {
    let yaml = r#"
selectors:
  - name: nightly
    description: everything tagged for the nightly build
    default: true
    definition:
      union:
        - method: tag
          value: nightly
        - exclude:
            - method: tag
              value: deprecated
  - name: staging
    definition: "stg_*"
"#;
    let file: SelectorFile = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(file.selectors.len(), 2);
    assert_eq!(file.default_selector().unwrap().name, "nightly");

    let spec = file
        .get("nightly")
        .unwrap()
        .parse(IndirectSelection::Eager)
        .unwrap();
    assert!(matches!(spec, SelectionSpec::Difference(_)));

    let spec = file
        .get("staging")
        .unwrap()
        .parse(IndirectSelection::Eager)
        .unwrap();
    assert_eq!(criteria(&spec).value, "stg_*");
}
