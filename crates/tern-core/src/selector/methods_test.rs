use super::*;
use crate::manifest::{Exposure, Macro, Manifest, ManifestNode, Metric, SourceDefinition, TestMetadata};
use crate::results::{RunResult, RunResultsArtifact};
use crate::state::{FreshnessArtifact, FreshnessResult};
use chrono::{TimeZone, Utc};

fn node(uid: &str, package: &str, name: &str, resource_type: ResourceType) -> ManifestNode {
    ManifestNode::new(uid, resource_type, package, name)
}

/// Two packages of models plus a test, a source, an exposure, and a metric.
fn fixture() -> Manifest {
    let mut manifest = Manifest::new("core");

    let mut stg_orders = node("model.core.stg_orders", "core", "stg_orders", ResourceType::Model);
    stg_orders.fqn = vec!["core".into(), "staging".into(), "stg_orders".into()];
    stg_orders.original_file_path = "models/staging/stg_orders.sql".into();
    stg_orders.tags = vec!["nightly".into()];
    stg_orders
        .config
        .insert("materialized".into(), Value::String("view".into()));
    manifest.add_node(stg_orders);

    let mut orders = node("model.core.orders", "core", "orders", ResourceType::Model);
    orders.fqn = vec!["core".into(), "marts".into(), "orders".into()];
    orders.original_file_path = "models/marts/orders.sql".into();
    orders.tags = vec!["nightly".into(), "finance".into()];
    orders.config.insert(
        "materialized".into(),
        Value::String("table".into()),
    );
    manifest.add_node(orders);

    let mut other = node("model.extras.audit", "extras", "audit", ResourceType::Model);
    other.fqn = vec!["extras".into(), "audit".into()];
    other.original_file_path = "models/audit.sql".into();
    manifest.add_node(other);

    let mut test = node(
        "test.core.not_null_orders_id",
        "core",
        "not_null_orders_id",
        ResourceType::Test,
    );
    test.test_metadata = Some(TestMetadata {
        name: "not_null".into(),
        kind: TestKind::Generic,
    });
    test.config
        .insert("severity".into(), Value::String("ERROR".into()));
    manifest.add_node(test);

    manifest.add_source(SourceDefinition::new(
        "source.core.raw.orders",
        "core",
        "raw",
        "orders",
    ));
    manifest.add_exposure(Exposure::new("exposure.core.dashboard", "core", "dashboard"));
    manifest.add_metric(Metric::new("metric.core.revenue", "core", "revenue"));

    manifest
}

fn all_ids(manifest: &Manifest) -> BTreeSet<UniqueId> {
    manifest.all_members().map(|m| m.unique_id().clone()).collect()
}

fn search(manifest: &Manifest, method: MethodName, value: &str) -> Vec<String> {
    search_with(manifest, None, method, Vec::new(), value).unwrap()
}

fn search_with(
    manifest: &Manifest,
    previous: Option<&PreviousState>,
    method: MethodName,
    arguments: Vec<String>,
    value: &str,
) -> CoreResult<Vec<String>> {
    let included = all_ids(manifest);
    let method = SelectorMethod::new(manifest, previous, method, arguments);
    let mut found: Vec<String> = method
        .search(&included, value)?
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    found.sort();
    Ok(found)
}

#[test]
fn test_fqn_matches_leaf_and_dotted_path() {
    let manifest = fixture();
    assert_eq!(
        search(&manifest, MethodName::Fqn, "stg_orders"),
        vec!["model.core.stg_orders"]
    );
    assert_eq!(
        search(&manifest, MethodName::Fqn, "core.staging.stg_orders"),
        vec!["model.core.stg_orders"]
    );
    // leading package segment can be left off
    assert_eq!(
        search(&manifest, MethodName::Fqn, "staging.stg_orders"),
        vec!["model.core.stg_orders"]
    );
}

#[test]
fn test_fqn_glob_matches_remainder() {
    let manifest = fixture();
    assert_eq!(
        search(&manifest, MethodName::Fqn, "core.*"),
        vec![
            "model.core.orders",
            "model.core.stg_orders",
            "test.core.not_null_orders_id"
        ]
    );
    assert_eq!(
        search(&manifest, MethodName::Fqn, "stg_*"),
        vec!["model.core.stg_orders"]
    );
}

#[test]
fn test_fqn_does_not_match_sources() {
    let manifest = fixture();
    let found = search(&manifest, MethodName::Fqn, "*");
    assert!(found.iter().all(|id| !id.starts_with("source.")));
}

#[test]
fn test_tag_membership_across_member_kinds() {
    let mut manifest = fixture();
    if let Some(source) = manifest.sources.get_mut("source.core.raw.orders") {
        source.tags.push("nightly".into());
    }
    assert_eq!(
        search(&manifest, MethodName::Tag, "nightly"),
        vec![
            "model.core.orders",
            "model.core.stg_orders",
            "source.core.raw.orders"
        ]
    );
    assert_eq!(
        search(&manifest, MethodName::Tag, "finance"),
        vec!["model.core.orders"]
    );
    assert!(search(&manifest, MethodName::Tag, "absent").is_empty());
}

#[test]
fn test_source_segments_wildcard_when_omitted() {
    let manifest = fixture();
    for selector in ["raw", "raw.orders", "core.raw.orders", "*.raw.*"] {
        assert_eq!(
            search(&manifest, MethodName::Source, selector),
            vec!["source.core.raw.orders"],
            "selector {selector}"
        );
    }
    assert!(search(&manifest, MethodName::Source, "raw.customers").is_empty());
}

#[test]
fn test_source_with_too_many_segments_is_error() {
    let manifest = fixture();
    let err = search_with(&manifest, None, MethodName::Source, Vec::new(), "a.b.c.d").unwrap_err();
    match err {
        CoreError::InvalidSelector { selector, .. } => assert_eq!(selector, "source:a.b.c.d"),
        other => panic!("expected InvalidSelector, got {other:?}"),
    }
}

#[test]
fn test_path_glob_and_directory_prefix() {
    let manifest = fixture();
    assert_eq!(
        search(&manifest, MethodName::Path, "models/staging/*.sql"),
        vec!["model.core.stg_orders"]
    );
    // a directory selects everything underneath it
    assert_eq!(
        search(&manifest, MethodName::Path, "models/staging"),
        vec!["model.core.stg_orders"]
    );
    let nested = search(&manifest, MethodName::Path, "models/**/*.sql");
    assert!(nested.contains(&"model.core.stg_orders".to_string()));
    assert!(nested.contains(&"model.core.orders".to_string()));
}

#[test]
fn test_package_exact_match() {
    let manifest = fixture();
    assert_eq!(
        search(&manifest, MethodName::Package, "extras"),
        vec!["model.extras.audit"]
    );
    let core = search(&manifest, MethodName::Package, "core");
    assert_eq!(core.len(), 6);
}

#[test]
fn test_config_dotted_descent() {
    let mut manifest = fixture();
    if let Some(node) = manifest.nodes.get_mut("model.core.orders") {
        node.config.insert(
            "persist_docs".into(),
            serde_json::json!({"relation": true}),
        );
    }
    assert_eq!(
        search_with(
            &manifest,
            None,
            MethodName::Config,
            vec!["materialized".into()],
            "table"
        )
        .unwrap(),
        vec!["model.core.orders"]
    );
    assert_eq!(
        search_with(
            &manifest,
            None,
            MethodName::Config,
            vec!["persist_docs".into(), "relation".into()],
            "true"
        )
        .unwrap(),
        vec!["model.core.orders"]
    );
}

#[test]
fn test_config_severity_is_case_insensitive() {
    let manifest = fixture();
    assert_eq!(
        search_with(
            &manifest,
            None,
            MethodName::Config,
            vec!["severity".into()],
            "error"
        )
        .unwrap(),
        vec!["test.core.not_null_orders_id"]
    );
    // other keys stay case-sensitive
    assert!(search_with(
        &manifest,
        None,
        MethodName::Config,
        vec!["materialized".into()],
        "TABLE"
    )
    .unwrap()
    .is_empty());
}

#[test]
fn test_test_name_and_test_type() {
    let manifest = fixture();
    assert_eq!(
        search(&manifest, MethodName::TestName, "not_null"),
        vec!["test.core.not_null_orders_id"]
    );
    assert_eq!(
        search(&manifest, MethodName::TestType, "generic"),
        vec!["test.core.not_null_orders_id"]
    );
    assert_eq!(
        search(&manifest, MethodName::TestType, "schema"),
        vec!["test.core.not_null_orders_id"]
    );
    assert!(search(&manifest, MethodName::TestType, "singular").is_empty());
    assert!(
        search_with(&manifest, None, MethodName::TestType, Vec::new(), "weird").is_err()
    );
}

#[test]
fn test_resource_type_rejects_unknown() {
    let manifest = fixture();
    assert_eq!(search(&manifest, MethodName::ResourceType, "model").len(), 3);
    assert_eq!(
        search(&manifest, MethodName::ResourceType, "exposure"),
        vec!["exposure.core.dashboard"]
    );
    assert!(
        search_with(&manifest, None, MethodName::ResourceType, Vec::new(), "view").is_err()
    );
}

#[test]
fn test_exposure_and_metric_selectors() {
    let manifest = fixture();
    assert_eq!(
        search(&manifest, MethodName::Exposure, "dashboard"),
        vec!["exposure.core.dashboard"]
    );
    assert_eq!(
        search(&manifest, MethodName::Exposure, "core.dashboard"),
        vec!["exposure.core.dashboard"]
    );
    assert_eq!(
        search(&manifest, MethodName::Metric, "revenue"),
        vec!["metric.core.revenue"]
    );
    assert!(
        search_with(&manifest, None, MethodName::Exposure, Vec::new(), "a.b.c").is_err()
    );
}

#[test]
fn test_state_requires_previous_manifest() {
    let manifest = fixture();
    let err = search_with(&manifest, None, MethodName::State, Vec::new(), "modified").unwrap_err();
    assert!(matches!(err, CoreError::MissingPreviousState { .. }));

    let empty = PreviousState::default();
    let err = search_with(&manifest, Some(&empty), MethodName::State, Vec::new(), "modified")
        .unwrap_err();
    assert!(matches!(err, CoreError::MissingPreviousState { .. }));
}

#[test]
fn test_state_new_and_modified() {
    let manifest = fixture();
    let mut old_manifest = manifest.clone();
    old_manifest.nodes.remove("model.extras.audit");
    if let Some(node) = old_manifest.nodes.get_mut("model.core.orders") {
        node.raw_sql = "select 1".into();
    }
    let previous = PreviousState {
        manifest: Some(old_manifest),
        ..PreviousState::default()
    };

    assert_eq!(
        search_with(&manifest, Some(&previous), MethodName::State, Vec::new(), "new").unwrap(),
        vec!["model.extras.audit"]
    );
    assert_eq!(
        search_with(&manifest, Some(&previous), MethodName::State, Vec::new(), "modified")
            .unwrap(),
        vec!["model.core.orders", "model.extras.audit"]
    );
    assert_eq!(
        search_with(
            &manifest,
            Some(&previous),
            MethodName::State,
            Vec::new(),
            "modified.body"
        )
        .unwrap(),
        vec!["model.core.orders", "model.extras.audit"]
    );
    assert!(search_with(
        &manifest,
        Some(&previous),
        MethodName::State,
        Vec::new(),
        "changed"
    )
    .is_err());
}

#[test]
fn test_state_modified_macros_recurses_with_cycle_protection() {
    let mut manifest = fixture();
    manifest.add_macro(Macro {
        unique_id: UniqueId::new("macro.core.a"),
        name: "a".into(),
        package_name: "core".into(),
        macro_sql: "v2".into(),
        depends_on_macros: vec![UniqueId::new("macro.core.b")],
    });
    manifest.add_macro(Macro {
        unique_id: UniqueId::new("macro.core.b"),
        name: "b".into(),
        package_name: "core".into(),
        macro_sql: "same".into(),
        // cycle back to a
        depends_on_macros: vec![UniqueId::new("macro.core.a")],
    });
    if let Some(node) = manifest.nodes.get_mut("model.core.orders") {
        node.depends_on.macros.push(UniqueId::new("macro.core.b"));
    }

    let mut old_manifest = manifest.clone();
    if let Some(mac) = old_manifest.macros.get_mut("macro.core.a") {
        mac.macro_sql = "v1".into();
    }
    let previous = PreviousState {
        manifest: Some(old_manifest),
        ..PreviousState::default()
    };

    // orders depends on b, b depends on the modified a
    assert_eq!(
        search_with(
            &manifest,
            Some(&previous),
            MethodName::State,
            Vec::new(),
            "modified.macros"
        )
        .unwrap(),
        vec!["model.core.orders"]
    );
}

#[test]
fn test_result_matches_previous_status() {
    let manifest = fixture();
    let results = RunResultsArtifact::new(
        vec![
            RunResult::immediate(
                UniqueId::new("model.core.orders"),
                NodeStatus::Error,
                None,
            ),
            RunResult::immediate(
                UniqueId::new("model.core.stg_orders"),
                NodeStatus::Success,
                None,
            ),
        ],
        0.1,
    );
    let previous = PreviousState {
        results: Some(results),
        ..PreviousState::default()
    };

    assert_eq!(
        search_with(&manifest, Some(&previous), MethodName::Result, Vec::new(), "error")
            .unwrap(),
        vec!["model.core.orders"]
    );
    assert!(search_with(
        &manifest,
        Some(&previous),
        MethodName::Result,
        Vec::new(),
        "exploded"
    )
    .is_err());
    assert!(search_with(&manifest, None, MethodName::Result, Vec::new(), "error").is_err());
}

#[test]
fn test_source_status_fresher() {
    let manifest = fixture();
    let at = |h| Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap();
    let previous = PreviousState {
        sources: Some(FreshnessArtifact {
            generated_at: at(0),
            results: vec![FreshnessResult {
                unique_id: UniqueId::new("source.core.raw.orders"),
                max_loaded_at: Some(at(1)),
                error: None,
            }],
        }),
        sources_current: Some(FreshnessArtifact {
            generated_at: at(0),
            results: vec![FreshnessResult {
                unique_id: UniqueId::new("source.core.raw.orders"),
                max_loaded_at: Some(at(2)),
                error: None,
            }],
        }),
        ..PreviousState::default()
    };
    assert_eq!(
        search_with(
            &manifest,
            Some(&previous),
            MethodName::SourceStatus,
            Vec::new(),
            "fresher"
        )
        .unwrap(),
        vec!["source.core.raw.orders"]
    );

    // equal timestamps are not "fresher"
    let mut stale = previous;
    if let Some(current) = stale.sources_current.as_mut() {
        current.results[0].max_loaded_at = Some(at(1));
    }
    assert!(search_with(
        &manifest,
        Some(&stale),
        MethodName::SourceStatus,
        Vec::new(),
        "fresher"
    )
    .unwrap()
    .is_empty());
}
