//! Domain types for requirement traceability.
//!
//! This module contains the core domain types for the reqtrace engine: the
//! hierarchical relationship model (direct edges plus their transitive
//! closure) and the flat trace-link model.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Title path separator used in closure rows and tree paths.
pub const PATH_SEPARATOR: &str = " > ";

/// Unique identifier for a requirement entity.
///
/// Requirement lifecycle is owned by the surrounding application; the engine
/// only references requirements by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequirementId(pub Uuid);

impl RequirementId {
    /// Create a new random requirement id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a requirement id from its string form.
    ///
    /// # Errors
    ///
    /// Returns the underlying parse error if `s` is not a valid UUID.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for RequirementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequirementId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Identifier for an organization/project scope.
///
/// Scopes bound visibility: entities and relationships are only reachable
/// through a scope the caller is authorized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub Uuid);

impl ScopeId {
    /// Create a new random scope id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a scope id from its string form.
    ///
    /// # Errors
    ///
    /// Returns the underlying parse error if `s` is not a valid UUID.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a trace link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkId(pub Uuid);

impl LinkId {
    /// Create a new random link id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a link id from its string form.
    ///
    /// # Errors
    ///
    /// Returns the underlying parse error if `s` is not a valid UUID.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of a requirement entity as seen through the entity directory.
///
/// The engine reads id, title, scope and the soft-delete flag; everything
/// else about a requirement lives in the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Unique identifier.
    pub id: RequirementId,

    /// Human-readable title (external id or name).
    pub title: String,

    /// Owning organization/project scope.
    pub scope_id: ScopeId,

    /// Whether the entity has been soft-deleted.
    pub is_deleted: bool,
}

/// An immediate parent-child relationship between two requirements.
///
/// The set of direct edges is a forest: acyclic, and no requirement has more
/// than one direct parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectEdge {
    /// The parent requirement.
    pub parent_id: RequirementId,

    /// The child requirement.
    pub child_id: RequirementId,
}

/// One reachable (ancestor, descendant) pair in the transitive closure.
///
/// Exactly one row exists per reachable pair. `depth` counts direct edges on
/// the path (1 for a direct edge); depth-0 self pairs are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureRow {
    /// The ancestor requirement.
    pub ancestor_id: RequirementId,

    /// The descendant requirement.
    pub descendant_id: RequirementId,

    /// Number of direct edges on the path from ancestor to descendant.
    pub depth: usize,

    /// Titles from ancestor to descendant inclusive, joined by
    /// [`PATH_SEPARATOR`].
    pub path: String,
}

/// Direction of a hierarchy query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Walk upward toward roots.
    Ancestors,

    /// Walk downward toward leaves.
    Descendants,

    /// Union of both walks, each entry tagged with its direction.
    Both,
}

/// Relationship side of a single hierarchy query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationSide {
    /// The entry is an ancestor of the queried requirement.
    Ancestor,

    /// The entry is a descendant of the queried requirement.
    Descendant,
}

/// One row of a hierarchy query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyEntry {
    /// The related requirement.
    pub id: RequirementId,

    /// Its current title, resolved through the entity directory.
    pub title: String,

    /// Distance in direct edges from the queried requirement.
    pub depth: usize,

    /// Whether this is an immediate relationship (`depth == 1`).
    pub direct: bool,

    /// Which side of the queried requirement this entry sits on.
    pub side: RelationSide,
}

/// One node of a reconstructed requirement tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// The requirement.
    pub id: RequirementId,

    /// Its current title.
    pub title: String,

    /// Direct parent, or `None` for roots.
    pub parent_id: Option<RequirementId>,

    /// 0 for roots, parent depth + 1 otherwise.
    pub depth: usize,

    /// Titles from the root to this node, joined by [`PATH_SEPARATOR`].
    pub path: String,

    /// Whether any direct edge points out of this node.
    pub has_children: bool,
}

/// Non-fatal findings surfaced while building a tree.
///
/// A cycle reaching the tree builder means a prior invariant violation; the
/// affected branch is dropped rather than looping forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityWarning {
    /// A node was reached twice on one root-to-leaf walk.
    CycleDetected {
        /// The requirement that reappeared on its own path.
        requirement_id: RequirementId,
        /// The path at which the repeat was observed.
        path: String,
    },

    /// A direct edge references a requirement the directory does not know.
    MissingEntity {
        /// The unresolvable requirement.
        requirement_id: RequirementId,
    },
}

/// A reconstructed forest for one scope, with any integrity findings.
#[derive(Debug, Clone, Default)]
pub struct TreeView {
    /// Nodes ordered by `path` ascending (subtrees contiguous, siblings
    /// alphabetical).
    pub nodes: Vec<TreeNode>,

    /// Defensive findings; empty unless a prior bug corrupted the store.
    pub warnings: Vec<IntegrityWarning>,
}

/// Result of a structural mutation, counted in closure rows written or
/// removed (the direct edge is its own depth-1 row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOutcome {
    /// Closure rows inserted or deleted by the operation.
    pub rows_touched: usize,
}

/// Outcome of a cycle pre-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleCheck {
    /// The proposed edge is safe to insert.
    Acyclic,

    /// The proposed edge would close a cycle.
    WouldCycle,

    /// The resulting chain would exceed the configured depth bound.
    ///
    /// Callers must treat this as a rejection (fail closed), not a
    /// truncation.
    DepthExceeded,
}

impl CycleCheck {
    /// Whether the proposed edge must be rejected.
    #[must_use]
    pub fn is_rejected(self) -> bool {
        !matches!(self, Self::Acyclic)
    }
}

/// A non-hierarchical traceability link between two arbitrary entities.
///
/// Trace links form an arbitrary, possibly cyclic graph kept deliberately
/// separate from the hierarchy: no closure, no cycle checking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceLink {
    /// Unique identifier.
    pub id: LinkId,

    /// Source entity id.
    pub source_id: Uuid,

    /// Source entity kind (e.g. "requirement", "test", "document").
    pub source_type: String,

    /// Target entity id.
    pub target_id: Uuid,

    /// Target entity kind.
    pub target_type: String,

    /// Relationship tag (e.g. "validates", "satisfies", "derives").
    pub link_type: String,

    /// Free-form description.
    pub description: String,

    /// Whether the link reads in both directions.
    pub bidirectional: bool,

    /// Opaque caller metadata; never interpreted by the engine.
    pub custom_properties: serde_json::Map<String, serde_json::Value>,

    /// Optimistic-concurrency / audit version, starting at 1.
    pub version: u64,

    /// Soft-delete flag; deleted rows are retained for audit.
    pub is_deleted: bool,

    /// Creation timestamp.
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// Last update timestamp.
    pub updated_at: chrono::DateTime<chrono::Utc>,

    /// Deletion timestamp, if soft-deleted.
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TraceLink {
    /// Whether `other` duplicates this link under the uniqueness policy
    /// (same source, target and link type; soft-deleted rows don't count).
    #[must_use]
    pub fn duplicates(&self, source_id: Uuid, target_id: Uuid, link_type: &str) -> bool {
        !self.is_deleted
            && self.source_id == source_id
            && self.target_id == target_id
            && self.link_type == link_type
    }
}

/// Data for creating a new trace link.
#[derive(Debug, Clone)]
pub struct NewTraceLink {
    /// Source entity id.
    pub source_id: Uuid,

    /// Source entity kind.
    pub source_type: String,

    /// Target entity id.
    pub target_id: Uuid,

    /// Target entity kind.
    pub target_type: String,

    /// Relationship tag.
    pub link_type: String,

    /// Free-form description.
    pub description: String,

    /// Whether the link reads in both directions.
    pub bidirectional: bool,

    /// Opaque caller metadata.
    pub custom_properties: serde_json::Map<String, serde_json::Value>,

    /// Insert even if an identical (source, target, link_type) row exists.
    pub force: bool,
}

impl NewTraceLink {
    /// Minimal constructor for the common requirement-to-entity case.
    #[must_use]
    pub fn new(
        source_id: Uuid,
        source_type: impl Into<String>,
        target_id: Uuid,
        target_type: impl Into<String>,
        link_type: impl Into<String>,
    ) -> Self {
        Self {
            source_id,
            source_type: source_type.into(),
            target_id,
            target_type: target_type.into(),
            link_type: link_type.into(),
            description: String::new(),
            bidirectional: false,
            custom_properties: serde_json::Map::new(),
            force: false,
        }
    }
}

/// Which side of a link an entity is matched against in `list_links`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkRole {
    /// Match links where the entity is the source.
    Source,

    /// Match links where the entity is the target.
    Target,

    /// Match links on either side.
    Either,
}

/// Filter for `list_links`.
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    /// Restrict to a single link type.
    pub link_type: Option<String>,

    /// Include soft-deleted rows (audit views).
    pub include_deleted: bool,
}

/// Per-requirement link counts in a traceability matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixRow {
    /// The requirement.
    pub id: RequirementId,

    /// Its current title.
    pub title: String,

    /// Links pointing at this requirement.
    pub parent_count: usize,

    /// Links pointing out of this requirement.
    pub child_count: usize,

    /// Total links touching this requirement.
    pub total_links: usize,
}

/// Aggregate traceability matrix for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMatrix {
    /// Per-requirement rows ordered by title.
    pub requirements: Vec<MatrixRow>,

    /// All live links touching requirements in the scope.
    pub links: Vec<TraceLink>,

    /// Requirements with no links at all.
    pub orphan_count: usize,

    /// Share of requirements with at least one link, 0.0..=100.0.
    pub coverage_percentage: f64,
}
