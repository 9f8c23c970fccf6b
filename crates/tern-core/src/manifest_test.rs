use super::*;
use tempfile::tempdir;

fn model(id: &str, name: &str) -> ManifestNode {
    ManifestNode::new(id, ResourceType::Model, "pkg", name)
}

#[test]
fn test_graph_member_lookup_across_collections() {
    let mut manifest = Manifest::new("proj");
    manifest.add_node(model("model.pkg.a", "a"));
    manifest.add_source(SourceDefinition::new("source.pkg.raw.orders", "pkg", "raw", "orders"));
    manifest.add_exposure(Exposure::new("exposure.pkg.dash", "pkg", "dash"));
    manifest.add_metric(Metric::new("metric.pkg.revenue", "pkg", "revenue"));

    assert!(matches!(
        manifest.graph_member("model.pkg.a"),
        Some(GraphMember::Node(_))
    ));
    assert!(matches!(
        manifest.graph_member("source.pkg.raw.orders"),
        Some(GraphMember::Source(_))
    ));
    assert!(matches!(
        manifest.graph_member("exposure.pkg.dash"),
        Some(GraphMember::Exposure(_))
    ));
    assert!(matches!(
        manifest.graph_member("metric.pkg.revenue"),
        Some(GraphMember::Metric(_))
    ));
    assert!(manifest.graph_member("model.pkg.missing").is_none());
    assert_eq!(manifest.all_members().count(), 4);
}

#[test]
fn test_expect_member_missing_is_internal_error() {
    let manifest = Manifest::new("proj");
    let err = manifest.expect_member("model.pkg.ghost").unwrap_err();
    assert!(matches!(err, CoreError::Internal(_)));
}

#[test]
fn test_is_ephemeral_model() {
    let mut node = model("model.pkg.a", "a");
    assert!(!node.is_ephemeral_model());

    node.config
        .insert("materialized".to_string(), Value::String("ephemeral".into()));
    assert!(node.is_ephemeral_model());

    // Only models can be ephemeral
    let mut test = ManifestNode::new("test.pkg.t", ResourceType::Test, "pkg", "t");
    test.config
        .insert("materialized".to_string(), Value::String("ephemeral".into()));
    assert!(!test.is_ephemeral_model());
}

#[test]
fn test_config_value_dotted_descent() {
    let mut node = model("model.pkg.a", "a");
    node.config.insert(
        "meta".to_string(),
        serde_json::json!({"owner": {"team": "core"}}),
    );

    let path = vec!["meta".to_string(), "owner".to_string(), "team".to_string()];
    assert_eq!(node.config_value(&path), Some(&Value::String("core".into())));

    let missing = vec!["meta".to_string(), "slack".to_string()];
    assert_eq!(node.config_value(&missing), None);
}

#[test]
fn test_same_body_uses_checksum() {
    let mut a = model("model.pkg.a", "a");
    a.raw_sql = "select 1".to_string();
    let mut b = a.clone();
    assert!(b.same_body(&a));

    b.raw_sql = "select 2".to_string();
    assert!(!b.same_body(&a));
}

#[test]
fn test_same_contents_none_is_changed() {
    let node = model("model.pkg.a", "a");
    assert!(!node.same_contents(None));
    assert!(node.same_contents(Some(&node.clone())));
}

#[test]
fn test_same_contents_detects_dependency_change() {
    let mut old = model("model.pkg.b", "b");
    old.depends_on.nodes = vec![UniqueId::new("model.pkg.a")];
    let mut new = old.clone();
    assert!(new.same_contents(Some(&old)));

    new.depends_on.nodes = vec![UniqueId::new("model.pkg.c")];
    assert!(!new.same_contents(Some(&old)));
}

#[test]
fn test_update_node_unknown_id_errors() {
    let mut manifest = Manifest::new("proj");
    let err = manifest.update_node(model("model.pkg.ghost", "ghost")).unwrap_err();
    assert!(matches!(err, CoreError::Internal(_)));
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("target").join("manifest.json");

    let mut manifest = Manifest::new("proj");
    let mut node = model("model.pkg.a", "a");
    node.tags = vec!["nightly".to_string()];
    manifest.add_node(node);
    manifest.add_macro(Macro {
        unique_id: UniqueId::new("macro.pkg.cents"),
        name: "cents".to_string(),
        package_name: "pkg".to_string(),
        macro_sql: "{% macro cents(x) %}{{ x }} / 100{% endmacro %}".to_string(),
        depends_on_macros: Vec::new(),
    });

    manifest.save(&path).unwrap();
    let loaded = Manifest::load(&path).unwrap();
    assert_eq!(loaded.project_name, "proj");
    assert_eq!(loaded.nodes.len(), 1);
    assert_eq!(loaded.macros.len(), 1);
    assert_eq!(loaded.nodes["model.pkg.a"].tags, vec!["nightly"]);
}

#[test]
fn test_relation_name_forms() {
    let mut node = model("model.pkg.a", "a");
    assert_eq!(node.relation_name(), "a");

    node.schema = Some("analytics".to_string());
    assert_eq!(node.relation_name(), "analytics.a");

    node.database = Some("prod".to_string());
    node.alias = Some("a_v2".to_string());
    assert_eq!(node.relation_name(), "prod.analytics.a_v2");
}
