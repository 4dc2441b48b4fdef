//! [`RelationStore`] implementation for the in-memory backend.

use crate::domain::{
    CycleCheck, Direction, DirectEdge, EntityRecord, HierarchyEntry, LinkFilter, LinkId, LinkRole,
    MutationOutcome, NewTraceLink, RelationSide, RequirementId, ScopeId, TraceLink, TraceMatrix,
    TreeView,
};
use crate::entities::EntityDirectory;
use crate::error::{Error, Result};
use crate::storage::{RelationStore, Snapshot};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::MutexGuard;
use uuid::Uuid;

use super::inner::InMemoryStoreInner;
use super::tree;
use super::InMemoryStore;

async fn lock_store(store: &InMemoryStore) -> Result<MutexGuard<'_, InMemoryStoreInner>> {
    tokio::time::timeout(store.lock_timeout, store.state.lock())
        .await
        .map_err(|_| Error::Contention)
}

/// Resolve a requirement that must exist and not be soft-deleted.
async fn require_entity(
    directory: &dyn EntityDirectory,
    id: RequirementId,
) -> Result<EntityRecord> {
    match directory.get_entity(&id).await? {
        Some(entity) if !entity.is_deleted => Ok(entity),
        _ => Err(Error::NotFound(id)),
    }
}

fn side_pairs(
    inner: &InMemoryStoreInner,
    id: RequirementId,
    side: RelationSide,
    max_depth: usize,
) -> Vec<(RequirementId, usize)> {
    inner
        .closure
        .values()
        .filter(|row| row.depth <= max_depth)
        .filter_map(|row| match side {
            RelationSide::Ancestor if row.descendant_id == id => Some((row.ancestor_id, row.depth)),
            RelationSide::Descendant if row.ancestor_id == id => {
                Some((row.descendant_id, row.depth))
            }
            _ => None,
        })
        .collect()
}

/// Turn closure pairs into entries, resolving titles through the directory
/// so renames are reflected and separator characters in titles survive.
async fn resolve_entries(
    inner: &InMemoryStoreInner,
    pairs: Vec<(RequirementId, usize)>,
    side: RelationSide,
) -> Result<Vec<HierarchyEntry>> {
    let mut entries = Vec::with_capacity(pairs.len());
    for (id, depth) in pairs {
        let title = match inner.directory.get_entity(&id).await? {
            Some(entity) => entity.title,
            None => id.to_string(),
        };
        entries.push(HierarchyEntry {
            id,
            title,
            depth,
            direct: depth == 1,
            side,
        });
    }
    entries.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.title.cmp(&b.title)));
    Ok(entries)
}

#[async_trait]
impl RelationStore for InMemoryStore {
    async fn create_relationship(
        &mut self,
        parent: RequirementId,
        child: RequirementId,
        actor: &str,
    ) -> Result<MutationOutcome> {
        let mut inner = lock_store(self).await?;
        let parent_entity = require_entity(inner.directory.as_ref(), parent).await?;
        let child_entity = require_entity(inner.directory.as_ref(), child).await?;

        let rows_touched =
            inner.apply_edge(parent, child, &parent_entity.title, &child_entity.title)?;
        if rows_touched == 0 {
            tracing::debug!(%parent, %child, actor, "relationship already exists, no-op");
        } else {
            tracing::info!(%parent, %child, actor, rows_touched, "relationship created");
        }
        Ok(MutationOutcome { rows_touched })
    }

    async fn delete_relationship(
        &mut self,
        parent: RequirementId,
        child: RequirementId,
        actor: &str,
    ) -> Result<MutationOutcome> {
        let mut inner = lock_store(self).await?;
        let rows_touched = inner.remove_edge(parent, child)?;
        tracing::info!(%parent, %child, actor, rows_touched, "relationship deleted");
        Ok(MutationOutcome { rows_touched })
    }

    async fn would_cycle(
        &self,
        ancestor: RequirementId,
        descendant: RequirementId,
        max_depth: usize,
    ) -> Result<CycleCheck> {
        let inner = lock_store(self).await?;
        require_entity(inner.directory.as_ref(), ancestor).await?;
        require_entity(inner.directory.as_ref(), descendant).await?;
        Ok(inner.cycle_check(ancestor, descendant, max_depth))
    }

    async fn query_hierarchy(
        &self,
        id: RequirementId,
        direction: Direction,
        max_depth: usize,
    ) -> Result<Vec<HierarchyEntry>> {
        let inner = lock_store(self).await?;
        require_entity(inner.directory.as_ref(), id).await?;

        let up = side_pairs(&inner, id, RelationSide::Ancestor, max_depth);
        let down = side_pairs(&inner, id, RelationSide::Descendant, max_depth);
        let entries = match direction {
            Direction::Ancestors => resolve_entries(&inner, up, RelationSide::Ancestor).await?,
            Direction::Descendants => {
                resolve_entries(&inner, down, RelationSide::Descendant).await?
            }
            Direction::Both => {
                let mut entries = resolve_entries(&inner, up, RelationSide::Ancestor).await?;
                entries
                    .extend(resolve_entries(&inner, down, RelationSide::Descendant).await?);
                entries
            }
        };
        Ok(entries)
    }

    async fn build_tree(&self, scope: &ScopeId) -> Result<TreeView> {
        let inner = lock_store(self).await?;
        let entities: HashMap<RequirementId, EntityRecord> = inner
            .directory
            .all_entities()
            .await?
            .into_iter()
            .map(|entity| (entity.id, entity))
            .collect();
        Ok(tree::build_forest(&inner, &entities, *scope))
    }

    async fn create_link(&mut self, link: NewTraceLink, actor: &str) -> Result<TraceLink> {
        let mut inner = lock_store(self).await?;

        if !link.force {
            if let Some(existing) = inner
                .links
                .values()
                .find(|row| row.duplicates(link.source_id, link.target_id, &link.link_type))
            {
                return Err(Error::AlreadyExists(existing.id));
            }
        }

        let now = chrono::Utc::now();
        let row = TraceLink {
            id: LinkId::random(),
            source_id: link.source_id,
            source_type: link.source_type,
            target_id: link.target_id,
            target_type: link.target_type,
            link_type: link.link_type,
            description: link.description,
            bidirectional: link.bidirectional,
            custom_properties: link.custom_properties,
            version: 1,
            is_deleted: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tracing::info!(link_id = %row.id, link_type = %row.link_type, actor, "trace link created");
        inner.links.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list_links(
        &self,
        entity_id: Uuid,
        role: LinkRole,
        filter: &LinkFilter,
    ) -> Result<Vec<TraceLink>> {
        let inner = lock_store(self).await?;
        let mut rows: Vec<TraceLink> = inner
            .links
            .values()
            .filter(|row| match role {
                LinkRole::Source => row.source_id == entity_id,
                LinkRole::Target => row.target_id == entity_id,
                LinkRole::Either => row.source_id == entity_id || row.target_id == entity_id,
            })
            .filter(|row| filter.include_deleted || !row.is_deleted)
            .filter(|row| {
                filter
                    .link_type
                    .as_ref()
                    .is_none_or(|wanted| row.link_type == *wanted)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(rows)
    }

    async fn get_link(&self, id: &LinkId) -> Result<Option<TraceLink>> {
        let inner = lock_store(self).await?;
        Ok(inner.links.get(id).cloned())
    }

    async fn delete_link(&mut self, id: &LinkId, actor: &str) -> Result<TraceLink> {
        let mut inner = lock_store(self).await?;
        let row = match inner.links.get_mut(id) {
            Some(row) if !row.is_deleted => row,
            _ => return Err(Error::LinkNotFound(*id)),
        };
        let now = chrono::Utc::now();
        row.is_deleted = true;
        row.deleted_at = Some(now);
        row.updated_at = now;
        row.version += 1;
        tracing::info!(link_id = %id, actor, "trace link soft-deleted");
        Ok(row.clone())
    }

    async fn link_matrix(&self, scope: &ScopeId) -> Result<TraceMatrix> {
        let inner = lock_store(self).await?;
        let mut requirements: Vec<EntityRecord> = inner
            .directory
            .entities_in_scope(scope)
            .await?
            .into_iter()
            .filter(|entity| !entity.is_deleted)
            .collect();
        requirements.sort_by(|a, b| a.title.cmp(&b.title));

        let ids: HashSet<Uuid> = requirements.iter().map(|entity| entity.id.0).collect();
        let mut links: Vec<TraceLink> = inner
            .links
            .values()
            .filter(|row| !row.is_deleted)
            .filter(|row| ids.contains(&row.source_id) || ids.contains(&row.target_id))
            .cloned()
            .collect();
        links.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));

        let rows: Vec<_> = requirements
            .into_iter()
            .map(|entity| {
                let parent_count = links.iter().filter(|l| l.target_id == entity.id.0).count();
                let child_count = links.iter().filter(|l| l.source_id == entity.id.0).count();
                crate::domain::MatrixRow {
                    id: entity.id,
                    title: entity.title,
                    parent_count,
                    child_count,
                    total_links: parent_count + child_count,
                }
            })
            .collect();

        let orphan_count = rows.iter().filter(|row| row.total_links == 0).count();
        let coverage_percentage = if rows.is_empty() {
            0.0
        } else {
            let linked = rows.len() - orphan_count;
            (linked as f64 / rows.len() as f64) * 100.0
        };

        Ok(TraceMatrix {
            requirements: rows,
            links,
            orphan_count,
            coverage_percentage,
        })
    }

    async fn export_snapshot(&self) -> Result<Snapshot> {
        let inner = lock_store(self).await?;
        let entities = inner.directory.all_entities().await?;

        let mut edges: Vec<DirectEdge> = inner
            .parent_of
            .iter()
            .map(|(child, parent)| DirectEdge {
                parent_id: *parent,
                child_id: *child,
            })
            .collect();
        edges.sort_by_key(|edge| (edge.parent_id, edge.child_id));

        let mut links: Vec<TraceLink> = inner.links.values().cloned().collect();
        links.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));

        Ok(Snapshot {
            entities,
            edges,
            links,
        })
    }

    async fn import_snapshot(
        &mut self,
        edges: Vec<DirectEdge>,
        links: Vec<TraceLink>,
    ) -> Result<()> {
        let mut inner = lock_store(self).await?;
        inner.graph.clear();
        inner.node_map.clear();
        inner.parent_of.clear();
        inner.closure.clear();
        inner.links.clear();

        for edge in edges {
            let parent = inner.directory.get_entity(&edge.parent_id).await?;
            let child = inner.directory.get_entity(&edge.child_id).await?;
            let (Some(parent), Some(child)) = (parent, child) else {
                tracing::warn!(
                    parent = %edge.parent_id,
                    child = %edge.child_id,
                    "skipping edge with unresolvable endpoint"
                );
                continue;
            };
            if let Err(error) = inner.apply_edge(edge.parent_id, edge.child_id, &parent.title, &child.title) {
                tracing::warn!(
                    parent = %edge.parent_id,
                    child = %edge.child_id,
                    %error,
                    "skipping invalid edge during import"
                );
            }
        }

        for link in links {
            inner.links.insert(link.id, link);
        }
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        Ok(())
    }

    async fn reload(&mut self) -> Result<()> {
        Ok(())
    }
}
