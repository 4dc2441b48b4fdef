//! Mutable state shared behind the store mutex.

use crate::domain::{CycleCheck, LinkId, RequirementId, TraceLink};
use crate::entities::EntityDirectory;
use crate::error::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;

use super::closure::{self, ClosureMap};

/// Direct-edge adjacency plus the derived closure table and the link store.
///
/// The graph holds one node per requirement that has ever participated in a
/// relationship, with edges pointing parent -> child. `parent_of` is the
/// forest invariant made explicit: at most one inbound edge per node.
/// `closure` is kept patch-consistent with the graph by the mutation paths
/// in this module; nothing ever recomputes it wholesale except snapshot
/// replay.
pub(crate) struct InMemoryStoreInner {
    pub(super) graph: DiGraph<RequirementId, ()>,
    pub(super) node_map: HashMap<RequirementId, NodeIndex>,
    pub(super) parent_of: HashMap<RequirementId, RequirementId>,
    pub(super) closure: ClosureMap,
    pub(super) links: HashMap<LinkId, TraceLink>,
    pub(super) directory: Arc<dyn EntityDirectory>,
    pub(super) cycle_depth: usize,
}

impl InMemoryStoreInner {
    pub(super) fn new(directory: Arc<dyn EntityDirectory>, cycle_depth: usize) -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
            parent_of: HashMap::new(),
            closure: ClosureMap::new(),
            links: HashMap::new(),
            directory,
            cycle_depth,
        }
    }

    pub(super) fn ensure_node(&mut self, id: RequirementId) -> NodeIndex {
        if let Some(&index) = self.node_map.get(&id) {
            return index;
        }
        let index = self.graph.add_node(id);
        self.node_map.insert(id, index);
        index
    }

    /// Validate and commit a direct edge, returning the number of closure
    /// rows inserted. `Ok(0)` means the exact edge already existed.
    ///
    /// Titles are passed in because entity lookup is async and happens
    /// before the caller takes this path.
    pub(super) fn apply_edge(
        &mut self,
        parent: RequirementId,
        child: RequirementId,
        parent_title: &str,
        child_title: &str,
    ) -> Result<usize> {
        match self.parent_of.get(&child) {
            Some(existing) if *existing == parent => return Ok(0),
            Some(existing) => {
                return Err(Error::AlreadyHasParent {
                    child,
                    existing_parent: *existing,
                });
            }
            None => {}
        }

        let check = closure::would_cycle_impl(&self.closure, parent, child, self.cycle_depth);
        if check.is_rejected() {
            return Err(Error::CycleDetected { parent, child });
        }

        let rows = closure::insert_patch(&self.closure, parent, child, parent_title, child_title);

        let parent_index = self.ensure_node(parent);
        let child_index = self.ensure_node(child);
        self.graph.add_edge(parent_index, child_index, ());
        self.parent_of.insert(child, parent);
        let touched = rows.len();
        for row in rows {
            self.closure.insert((row.ancestor_id, row.descendant_id), row);
        }
        Ok(touched)
    }

    /// Remove a direct edge and every closure row crossing it, returning the
    /// number of rows removed.
    pub(super) fn remove_edge(
        &mut self,
        parent: RequirementId,
        child: RequirementId,
    ) -> Result<usize> {
        if self.parent_of.get(&child) != Some(&parent) {
            return Err(Error::RelationshipNotFound { parent, child });
        }

        // Pair set must be captured before the maps are touched.
        let keys = closure::delete_patch(&self.closure, parent, child);

        if let (Some(&parent_index), Some(&child_index)) =
            (self.node_map.get(&parent), self.node_map.get(&child))
        {
            if let Some(edge) = self.graph.find_edge(parent_index, child_index) {
                self.graph.remove_edge(edge);
            }
        }
        self.parent_of.remove(&child);
        for key in &keys {
            self.closure.remove(key);
        }
        Ok(keys.len())
    }

    pub(super) fn cycle_check(
        &self,
        ancestor: RequirementId,
        descendant: RequirementId,
        max_depth: usize,
    ) -> CycleCheck {
        closure::would_cycle_impl(&self.closure, ancestor, descendant, max_depth)
    }
}
