//! Storage abstraction layer for reqtrace.
//!
//! This module provides the core store trait and factory for creating
//! storage backends. The relationship store (direct edges + transitive
//! closure) and the generic trace-link store sit behind a single
//! object-safe async trait so that callers never touch the persistence
//! mechanism directly.
//!
//! # Architecture
//!
//! Backends:
//!
//! - **In-memory**: closure map + petgraph adjacency held in RAM
//! - **JSONL**: the in-memory backend wrapped with snapshot persistence
//!
//! The trait is object-safe, allowing dynamic dispatch via
//! `Box<dyn RelationStore>`. Entity lookup is not part of the store: it is
//! injected as an [`EntityDirectory`](crate::entities::EntityDirectory)
//! collaborator that the store consults for existence, titles and scope
//! membership.
//!
//! # Example
//!
//! ```no_run
//! use reqtrace::domain::{EntityRecord, RequirementId, ScopeId};
//! use reqtrace::entities::InMemoryDirectory;
//! use reqtrace::storage::in_memory::new_in_memory_store;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> reqtrace::error::Result<()> {
//!     let scope = ScopeId::random();
//!     let parent = RequirementId::random();
//!     let child = RequirementId::random();
//!     let directory = InMemoryDirectory::with_entities([
//!         EntityRecord { id: parent, title: "REQ-001".into(), scope_id: scope, is_deleted: false },
//!         EntityRecord { id: child, title: "REQ-002".into(), scope_id: scope, is_deleted: false },
//!     ]);
//!
//!     let mut store = new_in_memory_store(directory);
//!     let outcome = store.create_relationship(parent, child, "alice").await?;
//!     println!("closure rows written: {}", outcome.rows_touched);
//!     Ok(())
//! }
//! ```

use crate::domain::{
    CycleCheck, Direction, DirectEdge, EntityRecord, HierarchyEntry, LinkFilter, LinkId, LinkRole,
    MutationOutcome, NewTraceLink, RequirementId, ScopeId, TraceLink, TraceMatrix, TreeView,
};
use crate::entities::{EntityDirectory, InMemoryDirectory};
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

// Storage backend implementations
pub mod in_memory;

/// Core store trait for hierarchy relationships and trace links.
///
/// # Method Categories
///
/// - **Relationship mutation**: `create_relationship`, `delete_relationship`
/// - **Hierarchy reads**: `would_cycle`, `query_hierarchy`, `build_tree`
/// - **Trace links**: `create_link`, `list_links`, `get_link`,
///   `delete_link`, `link_matrix`
/// - **Persistence**: `export_snapshot`, `import_snapshot`, `save`,
///   `reload`
///
/// # Invariants
///
/// Implementations must keep the closure table equal to the exact
/// transitive closure of the surviving direct edges after every mutation:
/// one row per reachable pair, depth = path length, no depth-0 self rows.
/// Mutations are atomic; a failed call leaves no partial state visible.
///
/// # Concurrency
///
/// All methods are safe for concurrent callers. Mutations serialize on the
/// store; the wait is bounded, and expiry reports the retryable
/// [`Contention`](crate::error::Error::Contention) error rather than
/// blocking indefinitely.
#[async_trait]
pub trait RelationStore: Send + Sync {
    // ========== Relationship mutation ==========

    /// Insert a direct edge and patch the closure.
    ///
    /// Re-creating an identical existing edge is an idempotent no-op that
    /// reports `rows_touched = 0`.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound` if either requirement is absent or soft-deleted
    /// - `Error::AlreadyHasParent` if the child has a different parent
    /// - `Error::CycleDetected` if the edge would close a cycle or exceed
    ///   the fail-closed depth bound
    /// - `Error::Contention` if the store lock could not be acquired in time
    async fn create_relationship(
        &mut self,
        parent: RequirementId,
        child: RequirementId,
        actor: &str,
    ) -> Result<MutationOutcome>;

    /// Remove a direct edge and every closure row whose path traversed it.
    ///
    /// # Errors
    ///
    /// - `Error::RelationshipNotFound` if no such direct edge exists
    /// - `Error::Contention` if the store lock could not be acquired in time
    async fn delete_relationship(
        &mut self,
        parent: RequirementId,
        child: RequirementId,
        actor: &str,
    ) -> Result<MutationOutcome>;

    // ========== Hierarchy reads ==========

    /// Check whether inserting `ancestor -> descendant` would close a cycle.
    ///
    /// Side-effect-free closure read. Chains whose depth would exceed
    /// `max_depth` report [`CycleCheck::DepthExceeded`], which callers must
    /// treat as a rejection.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if either requirement is absent or
    /// soft-deleted.
    async fn would_cycle(
        &self,
        ancestor: RequirementId,
        descendant: RequirementId,
        max_depth: usize,
    ) -> Result<CycleCheck>;

    /// Reachable set around one requirement, with depth and path metadata.
    ///
    /// Results are filtered to `depth <= max_depth` and ordered by depth
    /// ascending, then title ascending. `Direction::Both` returns ancestors
    /// followed by descendants, each entry tagged with its side.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the requirement is absent or
    /// soft-deleted.
    async fn query_hierarchy(
        &self,
        id: RequirementId,
        direction: Direction,
        max_depth: usize,
    ) -> Result<Vec<HierarchyEntry>>;

    /// Reconstruct the full forest for one scope.
    ///
    /// Roots are in-scope requirements with no incoming direct edge. Nodes
    /// are ordered by path; integrity findings (a cycle that slipped past
    /// the mutator) drop the affected branch and are surfaced as warnings.
    async fn build_tree(&self, scope: &ScopeId) -> Result<TreeView>;

    // ========== Trace links ==========

    /// Create a trace link.
    ///
    /// # Errors
    ///
    /// - `Error::AlreadyExists` for a live duplicate
    ///   (source, target, link_type), unless `link.force` is set
    /// - `Error::Contention` if the store lock could not be acquired in time
    async fn create_link(&mut self, link: NewTraceLink, actor: &str) -> Result<TraceLink>;

    /// Links touching one entity, on the given side, newest first.
    async fn list_links(
        &self,
        entity_id: Uuid,
        role: LinkRole,
        filter: &LinkFilter,
    ) -> Result<Vec<TraceLink>>;

    /// Fetch one link by id, including soft-deleted rows.
    async fn get_link(&self, id: &LinkId) -> Result<Option<TraceLink>>;

    /// Soft-delete a link, bumping its version. The row is retained for
    /// audit.
    ///
    /// # Errors
    ///
    /// Returns `Error::LinkNotFound` if the link does not exist or is
    /// already deleted.
    async fn delete_link(&mut self, id: &LinkId, actor: &str) -> Result<TraceLink>;

    /// Per-requirement link counts and coverage statistics for one scope.
    async fn link_matrix(&self, scope: &ScopeId) -> Result<TraceMatrix>;

    // ========== Persistence ==========

    /// Export the full store state (plus the directory's entities) for
    /// snapshot persistence.
    async fn export_snapshot(&self) -> Result<Snapshot>;

    /// Replace the store state from a snapshot's edges and links.
    ///
    /// The closure is rebuilt by replaying the edges; entities must already
    /// be present in the directory.
    async fn import_snapshot(&mut self, edges: Vec<DirectEdge>, links: Vec<TraceLink>)
        -> Result<()>;

    /// Persist to the backing file, if any.
    ///
    /// Takes `&self` so callers can save after read-only operations;
    /// backends use interior mutability. No-op for the plain in-memory
    /// backend.
    async fn save(&self) -> Result<()>;

    /// Restore state from the backing file, discarding unsaved changes.
    ///
    /// No-op for the plain in-memory backend.
    async fn reload(&mut self) -> Result<()>;
}

/// Full store state for snapshot persistence.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Entity records from the directory.
    pub entities: Vec<EntityRecord>,

    /// Direct edges. The closure is derived, never persisted.
    pub edges: Vec<DirectEdge>,

    /// All trace links, including soft-deleted rows.
    pub links: Vec<TraceLink>,
}

/// Storage backend configuration.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// In-memory storage (ephemeral).
    InMemory,

    /// JSONL snapshot file (persistent).
    Jsonl(PathBuf),
}

impl StoreBackend {
    /// Returns the data file path for file-based backends.
    #[must_use]
    pub fn data_path(&self) -> Option<&Path> {
        match self {
            StoreBackend::Jsonl(path) => Some(path),
            StoreBackend::InMemory => None,
        }
    }
}

/// Wrapper that adds JSONL snapshot persistence to the in-memory store.
///
/// `save()` writes the snapshot atomically; `reload()` re-reads the file,
/// resetting both the directory and the store state.
struct JsonlBackedStore {
    inner: Box<dyn RelationStore>,
    directory: Arc<InMemoryDirectory>,
    path: PathBuf,
}

#[async_trait]
impl RelationStore for JsonlBackedStore {
    async fn create_relationship(
        &mut self,
        parent: RequirementId,
        child: RequirementId,
        actor: &str,
    ) -> Result<MutationOutcome> {
        self.inner.create_relationship(parent, child, actor).await
    }

    async fn delete_relationship(
        &mut self,
        parent: RequirementId,
        child: RequirementId,
        actor: &str,
    ) -> Result<MutationOutcome> {
        self.inner.delete_relationship(parent, child, actor).await
    }

    async fn would_cycle(
        &self,
        ancestor: RequirementId,
        descendant: RequirementId,
        max_depth: usize,
    ) -> Result<CycleCheck> {
        self.inner.would_cycle(ancestor, descendant, max_depth).await
    }

    async fn query_hierarchy(
        &self,
        id: RequirementId,
        direction: Direction,
        max_depth: usize,
    ) -> Result<Vec<HierarchyEntry>> {
        self.inner.query_hierarchy(id, direction, max_depth).await
    }

    async fn build_tree(&self, scope: &ScopeId) -> Result<TreeView> {
        self.inner.build_tree(scope).await
    }

    async fn create_link(&mut self, link: NewTraceLink, actor: &str) -> Result<TraceLink> {
        self.inner.create_link(link, actor).await
    }

    async fn list_links(
        &self,
        entity_id: Uuid,
        role: LinkRole,
        filter: &LinkFilter,
    ) -> Result<Vec<TraceLink>> {
        self.inner.list_links(entity_id, role, filter).await
    }

    async fn get_link(&self, id: &LinkId) -> Result<Option<TraceLink>> {
        self.inner.get_link(id).await
    }

    async fn delete_link(&mut self, id: &LinkId, actor: &str) -> Result<TraceLink> {
        self.inner.delete_link(id, actor).await
    }

    async fn link_matrix(&self, scope: &ScopeId) -> Result<TraceMatrix> {
        self.inner.link_matrix(scope).await
    }

    async fn export_snapshot(&self) -> Result<Snapshot> {
        self.inner.export_snapshot().await
    }

    async fn import_snapshot(
        &mut self,
        edges: Vec<DirectEdge>,
        links: Vec<TraceLink>,
    ) -> Result<()> {
        self.inner.import_snapshot(edges, links).await
    }

    async fn save(&self) -> Result<()> {
        let snapshot = self.inner.export_snapshot().await?;
        in_memory::save_to_jsonl(&snapshot, &self.path).await
    }

    async fn reload(&mut self) -> Result<()> {
        if self.path.exists() {
            let (store, warnings) =
                in_memory::load_from_jsonl(&self.path, Arc::clone(&self.directory)).await?;
            for warning in &warnings {
                tracing::warn!(warning = ?warning, "JSONL reload warning");
            }
            self.inner = store;
        } else {
            // File doesn't exist - reset to empty state
            self.directory.clear().await;
            let directory: Arc<dyn EntityDirectory> = self.directory.clone();
            self.inner = in_memory::new_in_memory_store(directory);
        }
        Ok(())
    }
}

/// Create a store instance for the given backend.
///
/// The directory is the entity-lookup collaborator shared with the
/// surrounding application. For the JSONL backend it is also repopulated
/// from the snapshot on load.
///
/// # Errors
///
/// Returns `Error::Io` if the snapshot file cannot be read.
pub async fn create_store(
    backend: StoreBackend,
    directory: Arc<InMemoryDirectory>,
) -> Result<Box<dyn RelationStore>> {
    match backend {
        StoreBackend::InMemory => Ok(in_memory::new_in_memory_store(directory)),
        StoreBackend::Jsonl(path) => {
            let inner = if path.exists() {
                let (store, warnings) =
                    in_memory::load_from_jsonl(&path, Arc::clone(&directory)).await?;
                for warning in &warnings {
                    // Log warnings but continue - the store is still usable
                    tracing::warn!(warning = ?warning, "JSONL load warning");
                }
                store
            } else {
                // First run - start empty
                let empty: Arc<dyn EntityDirectory> = directory.clone();
                in_memory::new_in_memory_store(empty)
            };
            Ok(Box::new(JsonlBackedStore {
                inner,
                directory,
                path,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityRecord;
    use tempfile::TempDir;

    #[tokio::test]
    async fn jsonl_reload_restores_disk_state() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("trace.jsonl");
        let scope = ScopeId::random();

        let directory = Arc::new(InMemoryDirectory::new());
        let parent = RequirementId::random();
        let child = RequirementId::random();
        directory
            .upsert(EntityRecord {
                id: parent,
                title: "REQ-001".into(),
                scope_id: scope,
                is_deleted: false,
            })
            .await;
        directory
            .upsert(EntityRecord {
                id: child,
                title: "REQ-002".into(),
                scope_id: scope,
                is_deleted: false,
            })
            .await;

        let mut store = create_store(StoreBackend::Jsonl(path.clone()), Arc::clone(&directory))
            .await
            .unwrap();

        store.create_relationship(parent, child, "test").await.unwrap();
        store.save().await.unwrap();

        // Mutate in memory without saving, then reload
        store.delete_relationship(parent, child, "test").await.unwrap();
        store.reload().await.unwrap();

        let entries = store
            .query_hierarchy(child, Direction::Ancestors, 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, parent);
    }

    #[tokio::test]
    async fn jsonl_reload_with_missing_file_resets_state() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("trace.jsonl");
        let scope = ScopeId::random();

        let directory = Arc::new(InMemoryDirectory::new());
        let parent = RequirementId::random();
        let child = RequirementId::random();
        for (id, title) in [(parent, "REQ-001"), (child, "REQ-002")] {
            directory
                .upsert(EntityRecord {
                    id,
                    title: title.into(),
                    scope_id: scope,
                    is_deleted: false,
                })
                .await;
        }

        let mut store = create_store(StoreBackend::Jsonl(path.clone()), Arc::clone(&directory))
            .await
            .unwrap();
        store.create_relationship(parent, child, "test").await.unwrap();
        store.save().await.unwrap();

        std::fs::remove_file(&path).unwrap();
        store.reload().await.unwrap();

        // Directory was reset along with the store
        assert!(directory.get_entity(&parent).await.unwrap().is_none());
        assert!(store
            .query_hierarchy(child, Direction::Ancestors, 10)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn in_memory_backend_has_no_data_path() {
        assert!(StoreBackend::InMemory.data_path().is_none());
        let backend = StoreBackend::Jsonl(PathBuf::from("/tmp/trace.jsonl"));
        assert!(backend.data_path().is_some());
    }
}
