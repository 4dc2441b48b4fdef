//! Integration tests for the relationship store.
//!
//! These tests exercise the full store surface end to end: closure
//! maintenance across chained inserts and deletes, cycle and forest
//! validation, hierarchy queries, tree reconstruction and snapshot
//! persistence.

use reqtrace::domain::{
    CycleCheck, Direction, EntityRecord, RelationSide, RequirementId, ScopeId,
};
use reqtrace::entities::{EntityDirectory, InMemoryDirectory};
use reqtrace::error::Error;
use reqtrace::storage::in_memory::new_in_memory_store;
use reqtrace::storage::{create_store, RelationStore, StoreBackend};
use std::sync::Arc;
use tempfile::tempdir;

struct Fixture {
    store: Box<dyn RelationStore>,
    directory: Arc<InMemoryDirectory>,
    scope: ScopeId,
    ids: Vec<RequirementId>,
}

async fn fixture(titles: &[&str]) -> Fixture {
    let scope = ScopeId::random();
    let ids: Vec<RequirementId> = titles.iter().map(|_| RequirementId::random()).collect();
    let directory = InMemoryDirectory::with_entities(ids.iter().zip(titles).map(
        |(id, title)| EntityRecord {
            id: *id,
            title: (*title).to_string(),
            scope_id: scope,
            is_deleted: false,
        },
    ));
    let shared: Arc<dyn EntityDirectory> = directory.clone();
    let store = new_in_memory_store(shared);
    Fixture {
        store,
        directory,
        scope,
        ids,
    }
}

// ========== Closure maintenance ==========

#[tokio::test]
async fn chained_inserts_materialize_transitive_rows() {
    let mut f = fixture(&["REQ-001", "REQ-002", "REQ-003"]).await;

    let r1 = f.store.create_relationship(f.ids[0], f.ids[1], "test").await.unwrap();
    assert_eq!(r1.rows_touched, 1);

    // Hanging REQ-003 under REQ-002 also creates the REQ-001 pair
    let r2 = f.store.create_relationship(f.ids[1], f.ids[2], "test").await.unwrap();
    assert_eq!(r2.rows_touched, 2);

    let up = f
        .store
        .query_hierarchy(f.ids[2], Direction::Ancestors, 10)
        .await
        .unwrap();
    assert_eq!(up.len(), 2);
    assert_eq!(up[0].id, f.ids[1]);
    assert_eq!(up[0].depth, 1);
    assert!(up[0].direct);
    assert_eq!(up[1].id, f.ids[0]);
    assert_eq!(up[1].depth, 2);
    assert!(!up[1].direct);
}

#[tokio::test]
async fn grafting_a_subtree_creates_the_cross_product() {
    let mut f = fixture(&["A", "B", "C", "D"]).await;

    f.store.create_relationship(f.ids[0], f.ids[1], "test").await.unwrap();
    f.store.create_relationship(f.ids[2], f.ids[3], "test").await.unwrap();

    // Grafting C (with its child D) under B touches 4 pairs:
    // (B,C), (B,D), (A,C), (A,D)
    let outcome = f.store.create_relationship(f.ids[1], f.ids[2], "test").await.unwrap();
    assert_eq!(outcome.rows_touched, 4);

    let down = f
        .store
        .query_hierarchy(f.ids[0], Direction::Descendants, 10)
        .await
        .unwrap();
    assert_eq!(down.len(), 3);
    assert_eq!(down[2].depth, 3);
}

#[tokio::test]
async fn deleting_an_edge_removes_exactly_the_severed_pairs() {
    let mut f = fixture(&["A", "B", "C", "D"]).await;
    for window in [(0, 1), (1, 2), (2, 3)] {
        f.store
            .create_relationship(f.ids[window.0], f.ids[window.1], "test")
            .await
            .unwrap();
    }

    let outcome = f.store.delete_relationship(f.ids[1], f.ids[2], "test").await.unwrap();
    assert_eq!(outcome.rows_touched, 4);

    // The two halves survive independently
    let upper = f
        .store
        .query_hierarchy(f.ids[0], Direction::Descendants, 10)
        .await
        .unwrap();
    assert_eq!(upper.len(), 1);
    assert_eq!(upper[0].id, f.ids[1]);

    let lower = f
        .store
        .query_hierarchy(f.ids[3], Direction::Ancestors, 10)
        .await
        .unwrap();
    assert_eq!(lower.len(), 1);
    assert_eq!(lower[0].id, f.ids[2]);
}

#[tokio::test]
async fn deleting_a_missing_edge_fails() {
    let mut f = fixture(&["A", "B"]).await;

    let err = f
        .store
        .delete_relationship(f.ids[0], f.ids[1], "test")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RelationshipNotFound { .. }));
}

// ========== Validation ==========

#[tokio::test]
async fn cycles_are_rejected() {
    let mut f = fixture(&["A", "B", "C"]).await;
    f.store.create_relationship(f.ids[0], f.ids[1], "test").await.unwrap();
    f.store.create_relationship(f.ids[1], f.ids[2], "test").await.unwrap();

    // Closing the loop from the leaf back to the root
    let err = f
        .store
        .create_relationship(f.ids[2], f.ids[0], "test")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CycleDetected { .. }));

    // Self-loop
    let err = f
        .store
        .create_relationship(f.ids[0], f.ids[0], "test")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CycleDetected { .. }));
}

#[tokio::test]
async fn would_cycle_is_side_effect_free() {
    let mut f = fixture(&["A", "B"]).await;
    f.store.create_relationship(f.ids[0], f.ids[1], "test").await.unwrap();

    let check = f.store.would_cycle(f.ids[1], f.ids[0], 100).await.unwrap();
    assert_eq!(check, CycleCheck::WouldCycle);

    let check = f.store.would_cycle(f.ids[1], f.ids[1], 100).await.unwrap();
    assert_eq!(check, CycleCheck::WouldCycle);

    // The dry-run check must not have mutated anything
    let down = f
        .store
        .query_hierarchy(f.ids[0], Direction::Descendants, 10)
        .await
        .unwrap();
    assert_eq!(down.len(), 1);
}

#[tokio::test]
async fn deep_chains_fail_closed() {
    let mut f = fixture(&["A", "B", "C", "D"]).await;
    f.store.create_relationship(f.ids[0], f.ids[1], "test").await.unwrap();
    f.store.create_relationship(f.ids[1], f.ids[2], "test").await.unwrap();

    let check = f.store.would_cycle(f.ids[2], f.ids[3], 2).await.unwrap();
    assert_eq!(check, CycleCheck::DepthExceeded);
    assert!(check.is_rejected());
}

#[tokio::test]
async fn unknown_requirements_are_rejected() {
    let mut f = fixture(&["A"]).await;
    let ghost = RequirementId::random();

    let err = f
        .store
        .create_relationship(f.ids[0], ghost, "test")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(id) if id == ghost));

    let err = f.store.would_cycle(ghost, f.ids[0], 100).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

// ========== Hierarchy queries ==========

#[tokio::test]
async fn both_directions_tag_each_side() {
    let mut f = fixture(&["ROOT", "MID", "LEAF"]).await;
    f.store.create_relationship(f.ids[0], f.ids[1], "test").await.unwrap();
    f.store.create_relationship(f.ids[1], f.ids[2], "test").await.unwrap();

    let entries = f
        .store
        .query_hierarchy(f.ids[1], Direction::Both, 10)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].side, RelationSide::Ancestor);
    assert_eq!(entries[0].id, f.ids[0]);
    assert_eq!(entries[1].side, RelationSide::Descendant);
    assert_eq!(entries[1].id, f.ids[2]);
}

// ========== Tree reconstruction ==========

#[tokio::test]
async fn tree_orders_by_path_with_subtrees_contiguous() {
    let mut f = fixture(&["R2", "R1", "R1a", "R1b", "R2a"]).await;
    f.store.create_relationship(f.ids[1], f.ids[2], "test").await.unwrap();
    f.store.create_relationship(f.ids[1], f.ids[3], "test").await.unwrap();
    f.store.create_relationship(f.ids[0], f.ids[4], "test").await.unwrap();

    let view = f.store.build_tree(&f.scope).await.unwrap();
    assert!(view.warnings.is_empty());

    let paths: Vec<&str> = view.nodes.iter().map(|n| n.path.as_str()).collect();
    assert_eq!(
        paths,
        ["R1", "R1 > R1a", "R1 > R1b", "R2", "R2 > R2a"]
    );

    let r1 = &view.nodes[0];
    assert_eq!(r1.depth, 0);
    assert!(r1.has_children);
    assert_eq!(r1.parent_id, None);

    let r1a = &view.nodes[1];
    assert_eq!(r1a.depth, 1);
    assert!(!r1a.has_children);
    assert_eq!(r1a.parent_id, Some(f.ids[1]));
}

#[tokio::test]
async fn isolated_requirements_appear_as_childless_roots() {
    let f = fixture(&["LONER"]).await;

    let view = f.store.build_tree(&f.scope).await.unwrap();
    assert_eq!(view.nodes.len(), 1);
    assert_eq!(view.nodes[0].path, "LONER");
    assert!(!view.nodes[0].has_children);
}

#[tokio::test]
async fn tree_is_scoped() {
    let mut f = fixture(&["A", "B"]).await;
    f.store.create_relationship(f.ids[0], f.ids[1], "test").await.unwrap();

    let other = ScopeId::random();
    let view = f.store.build_tree(&other).await.unwrap();
    assert!(view.nodes.is_empty());
}

#[tokio::test]
async fn soft_deleted_requirements_leave_the_tree() {
    let mut f = fixture(&["A", "B", "C"]).await;
    f.store.create_relationship(f.ids[0], f.ids[1], "test").await.unwrap();
    f.store.create_relationship(f.ids[1], f.ids[2], "test").await.unwrap();

    f.directory.soft_delete(&f.ids[1]).await;

    let view = f.store.build_tree(&f.scope).await.unwrap();
    let paths: Vec<&str> = view.nodes.iter().map(|n| n.path.as_str()).collect();
    // B is gone; its orphaned child surfaces as a root
    assert_eq!(paths, ["A", "C"]);
}

// ========== Snapshot persistence ==========

#[tokio::test]
async fn jsonl_store_survives_a_restart() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("trace.jsonl");
    let scope = ScopeId::random();

    let parent = RequirementId::random();
    let child = RequirementId::random();
    let seed = [
        (parent, "REQ-001"),
        (child, "REQ-002"),
    ];

    {
        let directory = Arc::new(InMemoryDirectory::new());
        for (id, title) in seed {
            directory
                .upsert(EntityRecord {
                    id,
                    title: title.into(),
                    scope_id: scope,
                    is_deleted: false,
                })
                .await;
        }
        let mut store = create_store(StoreBackend::Jsonl(path.clone()), directory)
            .await
            .unwrap();
        store.create_relationship(parent, child, "test").await.unwrap();
        store.save().await.unwrap();
    }

    // Fresh process: empty directory, same file
    let directory = Arc::new(InMemoryDirectory::new());
    let store = create_store(StoreBackend::Jsonl(path), Arc::clone(&directory))
        .await
        .unwrap();

    assert!(directory.get_entity(&parent).await.unwrap().is_some());
    let up = store
        .query_hierarchy(child, Direction::Ancestors, 10)
        .await
        .unwrap();
    assert_eq!(up.len(), 1);
    assert_eq!(up[0].title, "REQ-001");
}
