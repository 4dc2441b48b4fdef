//! Collaborator boundaries: entity lookup and authorization.
//!
//! The engine never owns requirement lifecycle. It reads entity snapshots
//! through [`EntityDirectory`] and consults [`AccessPolicy`] before scoped
//! operations. Both are injected, so tests and embedders can swap in their
//! own implementations.

use crate::domain::{EntityRecord, RequirementId, ScopeId};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Read-only entity lookup collaborator.
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    /// Look up a requirement by id.
    ///
    /// Returns `None` if the directory has never seen the id. Soft-deleted
    /// entities are returned with `is_deleted = true`; callers decide
    /// whether they count.
    async fn get_entity(&self, id: &RequirementId) -> Result<Option<EntityRecord>>;

    /// All entities in one scope, including soft-deleted ones.
    async fn entities_in_scope(&self, scope: &ScopeId) -> Result<Vec<EntityRecord>>;

    /// Every entity the directory knows about, across all scopes.
    ///
    /// Used by snapshot export; not part of the query path.
    async fn all_entities(&self) -> Result<Vec<EntityRecord>>;
}

/// Authorization collaborator consulted before scoped operations.
pub trait AccessPolicy: Send + Sync {
    /// Whether `actor` may read and mutate within `scope`.
    fn can_access(&self, actor: &str, scope: &ScopeId) -> bool;
}

/// Policy that admits every actor to every scope.
///
/// The default for single-tenant embeddings; multi-tenant callers supply
/// their own policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_access(&self, _actor: &str, _scope: &ScopeId) -> bool {
        true
    }
}

/// In-memory entity directory.
///
/// Backs tests, the JSONL snapshot loader and the MCP workspace wiring. The
/// surrounding application mutates it through [`upsert`](Self::upsert) and
/// [`remove`](Self::remove); the engine only reads.
#[derive(Default)]
pub struct InMemoryDirectory {
    entities: RwLock<HashMap<RequirementId, EntityRecord>>,
}

impl InMemoryDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory pre-populated with `entities`, wrapped for
    /// sharing.
    #[must_use]
    pub fn with_entities(entities: impl IntoIterator<Item = EntityRecord>) -> Arc<Self> {
        let map = entities.into_iter().map(|e| (e.id, e)).collect();
        Arc::new(Self {
            entities: RwLock::new(map),
        })
    }

    /// Insert or replace an entity record.
    pub async fn upsert(&self, entity: EntityRecord) {
        self.entities.write().await.insert(entity.id, entity);
    }

    /// Mark an entity soft-deleted, if present.
    pub async fn soft_delete(&self, id: &RequirementId) {
        if let Some(entity) = self.entities.write().await.get_mut(id) {
            entity.is_deleted = true;
        }
    }

    /// Remove an entity record entirely.
    pub async fn remove(&self, id: &RequirementId) {
        self.entities.write().await.remove(id);
    }

    /// Drop every record. Used when reloading a snapshot from disk.
    pub async fn clear(&self) {
        self.entities.write().await.clear();
    }
}

#[async_trait]
impl EntityDirectory for InMemoryDirectory {
    async fn get_entity(&self, id: &RequirementId) -> Result<Option<EntityRecord>> {
        Ok(self.entities.read().await.get(id).cloned())
    }

    async fn entities_in_scope(&self, scope: &ScopeId) -> Result<Vec<EntityRecord>> {
        Ok(self
            .entities
            .read()
            .await
            .values()
            .filter(|e| e.scope_id == *scope)
            .cloned()
            .collect())
    }

    async fn all_entities(&self) -> Result<Vec<EntityRecord>> {
        Ok(self.entities.read().await.values().cloned().collect())
    }
}
