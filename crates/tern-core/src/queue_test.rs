use super::*;
use crate::manifest::ManifestNode;
use crate::node::ResourceType;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

fn id(s: &str) -> UniqueId {
    UniqueId::new(s)
}

/// Build a manifest + subset graph for a chain a -> b -> c plus a free `d`.
fn chain_queue() -> (Manifest, GraphQueue) {
    let mut manifest = Manifest::new("proj");
    for name in ["a", "b", "c", "d"] {
        manifest.add_node(ManifestNode::new(
            format!("model.pkg.{name}"),
            ResourceType::Model,
            "pkg",
            name,
        ));
    }
    let mut graph = Graph::new();
    graph.add_node(id("model.pkg.a"));
    graph.add_node(id("model.pkg.d"));
    graph.add_edge(id("model.pkg.a"), id("model.pkg.b"));
    graph.add_edge(id("model.pkg.b"), id("model.pkg.c"));

    let queue = GraphQueue::new(graph, &manifest).unwrap();
    (manifest, queue)
}

#[tokio::test]
async fn test_get_yields_only_ready_nodes() {
    let (_manifest, queue) = chain_queue();

    // a and d have no dependencies; b and c are pending
    let first = queue.get().await.unwrap();
    let second = queue.get().await.unwrap();
    let mut roots = vec![first.to_string(), second.to_string()];
    roots.sort();
    assert_eq!(roots, vec!["model.pkg.a", "model.pkg.d"]);

    // b only becomes available after a is done
    queue.mark_done("model.pkg.a").unwrap();
    assert_eq!(queue.get().await.unwrap(), "model.pkg.b");

    queue.mark_done("model.pkg.d").unwrap();
    queue.mark_done("model.pkg.b").unwrap();
    assert_eq!(queue.get().await.unwrap(), "model.pkg.c");
    queue.mark_done("model.pkg.c").unwrap();

    assert!(queue.empty());
    assert_eq!(queue.get().await, None);
}

#[tokio::test]
async fn test_mark_done_not_in_progress_is_internal_error() {
    let (_manifest, queue) = chain_queue();
    let err = queue.mark_done("model.pkg.c").unwrap_err();
    assert!(matches!(err, CoreError::Internal(_)));

    let err = queue.mark_done("model.pkg.ghost").unwrap_err();
    assert!(matches!(err, CoreError::Internal(_)));
}

#[tokio::test]
async fn test_join_waits_for_quiescence() {
    let (_manifest, queue) = chain_queue();
    let queue = Arc::new(queue);

    let worker = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            while let Some(node) = queue.get().await {
                tokio::time::sleep(Duration::from_millis(2)).await;
                queue.mark_done(node.as_str()).unwrap();
            }
        })
    };

    queue.join().await;
    assert!(queue.empty());
    worker.await.unwrap();
}

#[tokio::test]
async fn test_wait_until_something_was_done_returns_remaining() {
    let (_manifest, queue) = chain_queue();

    let a = queue.get().await.unwrap();
    assert_eq!(a, "model.pkg.a");

    let wait = queue.wait_until_something_was_done();
    queue.mark_done("model.pkg.a").unwrap();
    assert_eq!(wait.await, 3);
}

#[tokio::test]
async fn test_wait_until_something_was_done_when_quiescent() {
    let mut manifest = Manifest::new("proj");
    manifest.add_node(ManifestNode::new(
        "model.pkg.a",
        ResourceType::Model,
        "pkg",
        "a",
    ));
    let mut graph = Graph::new();
    graph.add_node(id("model.pkg.a"));
    let queue = GraphQueue::new(graph, &manifest).unwrap();

    let node = queue.get().await.unwrap();
    queue.mark_done(node.as_str()).unwrap();
    assert_eq!(queue.wait_until_something_was_done().await, 0);
}

#[tokio::test]
async fn test_progress_count_excludes_ephemeral() {
    let mut manifest = Manifest::new("proj");
    let mut eph = ManifestNode::new("model.pkg.cte", ResourceType::Model, "pkg", "cte");
    eph.config
        .insert("materialized".to_string(), Value::String("ephemeral".into()));
    manifest.add_node(eph);
    manifest.add_node(ManifestNode::new(
        "model.pkg.a",
        ResourceType::Model,
        "pkg",
        "a",
    ));

    let mut graph = Graph::new();
    graph.add_edge(id("model.pkg.cte"), id("model.pkg.a"));

    let queue = GraphQueue::new(graph, &manifest).unwrap();
    assert_eq!(queue.get_selected_nodes().len(), 2);
    assert_eq!(queue.progress_count(), 1);
    assert!(queue.is_ephemeral("model.pkg.cte"));
    assert!(!queue.is_ephemeral("model.pkg.a"));
}

#[tokio::test]
async fn test_empty_queue_yields_none_immediately() {
    let manifest = Manifest::new("proj");
    let queue = GraphQueue::new(Graph::new(), &manifest).unwrap();
    assert!(queue.empty());
    assert_eq!(queue.get().await, None);
    queue.join().await;
}

/// Dependencies must always complete before their dependents are handed
/// out, under real concurrency.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_premature_handout_under_concurrency() {
    // Layered graph: roots r0..r2, mids m0..m2 (each on all roots),
    // leaves l0..l2 (each on all mids).
    let mut manifest = Manifest::new("proj");
    let mut graph = Graph::new();
    let layer = |prefix: &str, i: usize| format!("model.pkg.{prefix}{i}");
    for i in 0..3 {
        for prefix in ["r", "m", "l"] {
            manifest.add_node(ManifestNode::new(
                layer(prefix, i),
                ResourceType::Model,
                "pkg",
                format!("{prefix}{i}"),
            ));
        }
    }
    for i in 0..3 {
        for j in 0..3 {
            graph.add_edge(id(&layer("r", i)), id(&layer("m", j)));
            graph.add_edge(id(&layer("m", i)), id(&layer("l", j)));
        }
    }
    let full = graph.clone();
    let queue = Arc::new(GraphQueue::new(graph, &manifest).unwrap());
    let done: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

    let mut workers = Vec::new();
    for _ in 0..4 {
        let queue = Arc::clone(&queue);
        let done = Arc::clone(&done);
        let full = full.clone();
        workers.push(tokio::spawn(async move {
            while let Some(node) = queue.get().await {
                {
                    let done = done.lock().unwrap();
                    for parent in full.parents_of(node.as_str()).unwrap() {
                        assert!(
                            done.contains(parent.as_str()),
                            "{node} handed out before {parent} completed"
                        );
                    }
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
                done.lock().unwrap().insert(node.to_string());
                queue.mark_done(node.as_str()).unwrap();
            }
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }
    assert_eq!(done.lock().unwrap().len(), 9);
}
