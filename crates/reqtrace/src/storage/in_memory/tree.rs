//! Scope-wide tree reconstruction from the direct-edge graph.

use crate::domain::{EntityRecord, IntegrityWarning, RequirementId, ScopeId, TreeNode, TreeView,
    PATH_SEPARATOR};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

use super::inner::InMemoryStoreInner;

/// Rebuild the forest for one scope, ordered by materialized path.
///
/// Roots are in-scope entities with no parent (or whose parent lies outside
/// the scope, so the subtree still renders). The walk never revisits a node;
/// a repeated node means the stored state violates the forest invariant, so
/// it is surfaced as a warning instead of being walked again. Entities with
/// no relationships at all still appear as childless roots.
pub(super) fn build_forest(
    inner: &InMemoryStoreInner,
    entities: &HashMap<RequirementId, EntityRecord>,
    scope: ScopeId,
) -> TreeView {
    let in_scope = |id: &RequirementId| {
        entities
            .get(id)
            .is_some_and(|record| record.scope_id == scope && !record.is_deleted)
    };

    let mut roots: Vec<&EntityRecord> = entities
        .values()
        .filter(|record| record.scope_id == scope && !record.is_deleted)
        .filter(|record| match inner.parent_of.get(&record.id) {
            None => true,
            Some(parent) => !in_scope(parent),
        })
        .collect();
    roots.sort_by(|a, b| a.title.cmp(&b.title));

    let mut view = TreeView {
        nodes: Vec::new(),
        warnings: Vec::new(),
    };
    let mut visited: HashSet<RequirementId> = HashSet::new();

    for root in roots {
        walk(inner, entities, &in_scope, root, None, 0, &root.title, &mut visited, &mut view);
    }

    view.nodes.sort_by(|a, b| a.path.cmp(&b.path));
    view
}

#[allow(clippy::too_many_arguments)]
fn walk(
    inner: &InMemoryStoreInner,
    entities: &HashMap<RequirementId, EntityRecord>,
    in_scope: &dyn Fn(&RequirementId) -> bool,
    record: &EntityRecord,
    parent_id: Option<RequirementId>,
    depth: usize,
    path: &str,
    visited: &mut HashSet<RequirementId>,
    view: &mut TreeView,
) {
    if !visited.insert(record.id) {
        tracing::error!(requirement_id = %record.id, path, "node reachable twice, forest invariant violated");
        view.warnings.push(IntegrityWarning::CycleDetected {
            requirement_id: record.id,
            path: path.to_string(),
        });
        return;
    }

    let mut children: Vec<&EntityRecord> = Vec::new();
    if let Some(&index) = inner.node_map.get(&record.id) {
        for neighbor in inner.graph.neighbors_directed(index, Direction::Outgoing) {
            let child_id = inner.graph[neighbor];
            match entities.get(&child_id) {
                Some(child) if in_scope(&child_id) => children.push(child),
                Some(_) => {}
                None => {
                    tracing::error!(requirement_id = %child_id, "edge points at unknown entity");
                    view.warnings.push(IntegrityWarning::MissingEntity {
                        requirement_id: child_id,
                    });
                }
            }
        }
    }
    children.sort_by(|a, b| a.title.cmp(&b.title));

    view.nodes.push(TreeNode {
        id: record.id,
        title: record.title.clone(),
        parent_id,
        depth,
        path: path.to_string(),
        has_children: !children.is_empty(),
    });

    for child in children {
        let child_path = format!("{path}{PATH_SEPARATOR}{}", child.title);
        walk(
            inner,
            entities,
            in_scope,
            child,
            Some(record.id),
            depth + 1,
            &child_path,
            visited,
            view,
        );
    }
}
