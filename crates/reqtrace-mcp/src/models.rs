//! MCP parameter and response models.
//!
//! These types are used for deserializing tool parameters and serializing
//! responses. They wrap or flatten reqtrace domain types for MCP transport:
//! ids travel as strings, enums as lowercase names.

use reqtrace::domain::{Direction, HierarchyEntry, LinkRole, RelationSide, TraceLink, TreeNode};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ========== Tool parameters ==========

/// Parameters for the `set_context` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SetContextParams {
    /// Absolute path to the workspace root (the directory containing
    /// `.reqtrace/`).
    pub workspace_root: String,
}

/// Parameters for the `register_requirement` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RegisterRequirementParams {
    /// Requirement id (UUID); generated when omitted.
    pub requirement_id: Option<String>,

    /// Human-readable title (external id or name).
    pub title: String,

    /// Owning organization/project scope (UUID).
    pub organization_id: String,

    /// Acting identity for authorization and audit.
    pub actor: Option<String>,

    /// Workspace to operate on; defaults to the current context.
    pub workspace_root: Option<String>,
}

/// Parameters for the `create_relationship` and `delete_relationship` tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RelationshipParams {
    /// Parent requirement id (UUID).
    pub parent_id: String,

    /// Child requirement id (UUID).
    pub child_id: String,

    /// Acting identity for authorization and audit.
    pub actor: Option<String>,

    /// Workspace to operate on; defaults to the current context.
    pub workspace_root: Option<String>,
}

/// Parameters for the `validate_cycle` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ValidateCycleParams {
    /// Proposed ancestor requirement id (UUID).
    pub ancestor_id: String,

    /// Proposed descendant requirement id (UUID).
    pub descendant_id: String,

    /// Depth bound for the fail-closed check; defaults to the workspace
    /// configuration.
    pub max_depth: Option<usize>,

    /// Acting identity for authorization and audit.
    pub actor: Option<String>,

    /// Workspace to operate on; defaults to the current context.
    pub workspace_root: Option<String>,
}

/// Parameters for the `query_hierarchy` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryHierarchyParams {
    /// Requirement to query around (UUID).
    pub requirement_id: String,

    /// Traversal direction: "ancestors", "descendants" or "both"
    /// (default "both").
    pub direction: Option<String>,

    /// Depth filter; defaults to the workspace configuration.
    pub max_depth: Option<usize>,

    /// Acting identity for authorization and audit.
    pub actor: Option<String>,

    /// Workspace to operate on; defaults to the current context.
    pub workspace_root: Option<String>,
}

/// Parameters for the `build_tree` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct BuildTreeParams {
    /// Organization/project scope to reconstruct (UUID).
    pub organization_id: String,

    /// Acting identity for authorization.
    pub actor: Option<String>,

    /// Workspace to operate on; defaults to the current context.
    pub workspace_root: Option<String>,
}

/// Parameters for the `create_link` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateLinkParams {
    /// Source entity id (UUID).
    pub source_id: String,

    /// Source entity kind (default "requirement").
    pub source_type: Option<String>,

    /// Target entity id (UUID).
    pub target_id: String,

    /// Target entity kind (default "requirement").
    pub target_type: Option<String>,

    /// Relationship tag (e.g. "validates", "satisfies", "derives").
    pub link_type: String,

    /// Free-form description.
    pub description: Option<String>,

    /// Whether the link reads in both directions.
    pub bidirectional: Option<bool>,

    /// Opaque metadata stored verbatim on the link.
    pub custom_properties: Option<serde_json::Map<String, serde_json::Value>>,

    /// Create even if an identical (source, target, link_type) row exists.
    pub force: Option<bool>,

    /// Acting identity for authorization and audit.
    pub actor: Option<String>,

    /// Workspace to operate on; defaults to the current context.
    pub workspace_root: Option<String>,
}

/// Parameters for the `list_links` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListLinksParams {
    /// Entity to list links for (UUID).
    pub entity_id: String,

    /// Which side to match: "source", "target" or "either"
    /// (default "either").
    pub role: Option<String>,

    /// Restrict to a single link type.
    pub link_type: Option<String>,

    /// Include soft-deleted rows (audit view).
    pub include_deleted: Option<bool>,

    /// Acting identity for authorization and audit.
    pub actor: Option<String>,

    /// Workspace to operate on; defaults to the current context.
    pub workspace_root: Option<String>,
}

/// Parameters for the `delete_link` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteLinkParams {
    /// Link to soft-delete (UUID).
    pub link_id: String,

    /// Acting identity for authorization and audit.
    pub actor: Option<String>,

    /// Workspace to operate on; defaults to the current context.
    pub workspace_root: Option<String>,
}

/// Parameters for the `trace_matrix` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TraceMatrixParams {
    /// Organization/project scope to report on (UUID).
    pub organization_id: String,

    /// Acting identity for authorization.
    pub actor: Option<String>,

    /// Workspace to operate on; defaults to the current context.
    pub workspace_root: Option<String>,
}

// ========== Tool responses ==========

/// Response from the `set_context` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SetContextResponse {
    /// The workspace root that was set.
    pub workspace_root: String,

    /// The path to the snapshot file.
    pub data_path: String,

    /// Status message.
    pub message: String,
}

/// Response from the `where_am_i` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WhereAmIResponse {
    /// The current workspace root, if set.
    pub workspace_root: Option<String>,

    /// The current snapshot path, if set.
    pub data_path: Option<String>,

    /// Whether a context is currently set.
    pub context_set: bool,
}

/// Response from the `register_requirement` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RegisterRequirementResponse {
    /// The requirement id (generated when not supplied).
    pub requirement_id: String,

    /// The registered title.
    pub title: String,

    /// The owning scope.
    pub organization_id: String,
}

/// Response from relationship mutations.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RelationshipResponse {
    /// Parent requirement id.
    pub parent_id: String,

    /// Child requirement id.
    pub child_id: String,

    /// Closure rows written or removed (0 for an idempotent re-create).
    pub rows_touched: usize,

    /// Human-readable outcome.
    pub message: String,
}

/// Hierarchy entry for MCP responses.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct McpHierarchyEntry {
    /// Related requirement id.
    pub id: String,

    /// Its title.
    pub title: String,

    /// Distance in direct edges from the queried requirement.
    pub depth: usize,

    /// Whether this is an immediate relationship.
    pub direct: bool,

    /// "ancestor" or "descendant".
    pub side: String,
}

impl From<HierarchyEntry> for McpHierarchyEntry {
    fn from(entry: HierarchyEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            title: entry.title,
            depth: entry.depth,
            direct: entry.direct,
            side: side_to_string(entry.side),
        }
    }
}

/// Response from the `validate_cycle` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ValidateCycleResponse {
    /// Whether the proposed edge may be inserted.
    pub valid: bool,

    /// Why the edge was rejected, if it was.
    pub reason: Option<String>,

    /// For a detected cycle, the existing closure entry that makes the
    /// proposed descendant an ancestor of the proposed ancestor.
    pub offending_ancestor: Option<McpHierarchyEntry>,
}

/// Response from the `query_hierarchy` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryHierarchyResponse {
    /// The queried requirement id.
    pub requirement_id: String,

    /// The direction that was applied.
    pub direction: String,

    /// The depth bound that was applied.
    pub max_depth: usize,

    /// Matching entries, depth ascending then title ascending.
    pub entries: Vec<McpHierarchyEntry>,

    /// Number of entries.
    pub total: usize,
}

/// Tree node for MCP responses.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct McpTreeNode {
    /// Requirement id.
    pub id: String,

    /// Its title.
    pub title: String,

    /// Direct parent id, absent for roots.
    pub parent_id: Option<String>,

    /// 0 for roots.
    pub depth: usize,

    /// Titles from the root to this node.
    pub path: String,

    /// Whether any direct edge points out of this node.
    pub has_children: bool,
}

impl From<TreeNode> for McpTreeNode {
    fn from(node: TreeNode) -> Self {
        Self {
            id: node.id.to_string(),
            title: node.title,
            parent_id: node.parent_id.map(|id| id.to_string()),
            depth: node.depth,
            path: node.path,
            has_children: node.has_children,
        }
    }
}

/// Response from the `build_tree` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TreeResponse {
    /// Display nodes ordered by path. Childless isolated roots are
    /// filtered out of the display but still counted in `orphan_count`.
    pub nodes: Vec<McpTreeNode>,

    /// Human-readable rendering, one line per displayed node.
    pub hierarchy_view: Vec<String>,

    /// Every node in the scope, before display filtering.
    pub total_nodes: usize,

    /// Number of roots.
    pub root_count: usize,

    /// Roots with no children (excluded from display).
    pub orphan_count: usize,

    /// Deepest node depth.
    pub max_depth: usize,

    /// Integrity findings; empty unless stored state is corrupt.
    pub warnings: Vec<String>,
}

/// Trace link representation for MCP responses.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct McpTraceLink {
    /// Unique identifier.
    pub id: String,

    /// Source entity id.
    pub source_id: String,

    /// Source entity kind.
    pub source_type: String,

    /// Target entity id.
    pub target_id: String,

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

    /// Version counter, starting at 1.
    pub version: u64,

    /// Soft-delete flag.
    pub is_deleted: bool,

    /// Creation timestamp (ISO 8601).
    pub created_at: String,

    /// Last update timestamp (ISO 8601).
    pub updated_at: String,

    /// Deletion timestamp (ISO 8601), if soft-deleted.
    pub deleted_at: Option<String>,
}

impl From<TraceLink> for McpTraceLink {
    fn from(link: TraceLink) -> Self {
        Self {
            id: link.id.to_string(),
            source_id: link.source_id.to_string(),
            source_type: link.source_type,
            target_id: link.target_id.to_string(),
            target_type: link.target_type,
            link_type: link.link_type,
            description: link.description,
            bidirectional: link.bidirectional,
            custom_properties: link.custom_properties,
            version: link.version,
            is_deleted: link.is_deleted,
            created_at: link.created_at.to_rfc3339(),
            updated_at: link.updated_at.to_rfc3339(),
            deleted_at: link.deleted_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Per-requirement row of the `trace_matrix` response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct McpMatrixRow {
    /// Requirement id.
    pub id: String,

    /// Its title.
    pub title: String,

    /// Links pointing at this requirement.
    pub parent_count: usize,

    /// Links pointing out of this requirement.
    pub child_count: usize,

    /// Total links touching this requirement.
    pub total_links: usize,
}

/// Response from the `trace_matrix` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MatrixResponse {
    /// Per-requirement rows ordered by title.
    pub requirements: Vec<McpMatrixRow>,

    /// Live links touching requirements in the scope.
    pub links: Vec<McpTraceLink>,

    /// Number of requirements in the scope.
    pub total_requirements: usize,

    /// Number of live links.
    pub total_links: usize,

    /// Requirements with no links at all.
    pub orphan_count: usize,

    /// Share of requirements with at least one link, 0.0..=100.0.
    pub coverage_percentage: f64,
}

// ========== String conversions ==========

/// Convert a `RelationSide` to its string representation.
#[must_use]
pub fn side_to_string(side: RelationSide) -> String {
    match side {
        RelationSide::Ancestor => "ancestor".to_string(),
        RelationSide::Descendant => "descendant".to_string(),
    }
}

/// Convert a `Direction` to its string representation.
#[must_use]
pub fn direction_to_string(direction: Direction) -> String {
    match direction {
        Direction::Ancestors => "ancestors".to_string(),
        Direction::Descendants => "descendants".to_string(),
        Direction::Both => "both".to_string(),
    }
}

/// Parse a direction string into a `Direction`.
#[must_use]
pub fn parse_direction(s: &str) -> Option<Direction> {
    match s.to_lowercase().as_str() {
        "ancestors" | "up" => Some(Direction::Ancestors),
        "descendants" | "down" => Some(Direction::Descendants),
        "both" => Some(Direction::Both),
        _ => None,
    }
}

/// Parse a link role string into a `LinkRole`.
#[must_use]
pub fn parse_role(s: &str) -> Option<LinkRole> {
    match s.to_lowercase().as_str() {
        "source" => Some(LinkRole::Source),
        "target" => Some(LinkRole::Target),
        "either" | "any" => Some(LinkRole::Either),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::ancestors("ancestors", Some(Direction::Ancestors))]
    #[case::up("up", Some(Direction::Ancestors))]
    #[case::descendants("descendants", Some(Direction::Descendants))]
    #[case::down("down", Some(Direction::Descendants))]
    #[case::both("both", Some(Direction::Both))]
    #[case::uppercase("BOTH", Some(Direction::Both))]
    #[case::invalid("sideways", None)]
    #[case::empty("", None)]
    fn test_parse_direction(#[case] input: &str, #[case] expected: Option<Direction>) {
        assert_eq!(parse_direction(input), expected);
    }

    #[rstest]
    #[case::source("source", Some(LinkRole::Source))]
    #[case::target("target", Some(LinkRole::Target))]
    #[case::either("either", Some(LinkRole::Either))]
    #[case::any("any", Some(LinkRole::Either))]
    #[case::uppercase("SOURCE", Some(LinkRole::Source))]
    #[case::invalid("middle", None)]
    fn test_parse_role(#[case] input: &str, #[case] expected: Option<LinkRole>) {
        assert_eq!(parse_role(input), expected);
    }

    #[test]
    fn direction_roundtrip() {
        for direction in [Direction::Ancestors, Direction::Descendants, Direction::Both] {
            assert_eq!(parse_direction(&direction_to_string(direction)), Some(direction));
        }
    }
}
