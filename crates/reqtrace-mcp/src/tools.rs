//! MCP tool implementations.
//!
//! This module contains the implementations for all MCP tools exposed by
//! the server. Each tool resolves a workspace handle from the context,
//! checks the access policy for the scope it touches, then calls into the
//! store.

use crate::context::{Context, WorkspaceHandle};
use crate::error::{Error, Result};
use crate::models::{
    direction_to_string, parse_direction, parse_role, McpHierarchyEntry, McpMatrixRow,
    McpTraceLink, McpTreeNode, MatrixResponse, QueryHierarchyResponse, RegisterRequirementResponse,
    RelationshipResponse, SetContextResponse, TreeResponse, ValidateCycleResponse,
    WhereAmIResponse,
};
use reqtrace::domain::{
    CycleCheck, Direction, EntityRecord, IntegrityWarning, LinkFilter, LinkId, LinkRole,
    NewTraceLink, RequirementId, ScopeId,
};
use reqtrace::entities::{AccessPolicy, AllowAll, EntityDirectory};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Actor recorded when the caller does not name one.
const DEFAULT_ACTOR: &str = "mcp";

/// Entity kind that resolves through the requirement directory.
const REQUIREMENT_KIND: &str = "requirement";

/// Tool implementations for the reqtrace MCP server.
pub struct Tools {
    context: Arc<RwLock<Context>>,
    policy: Arc<dyn AccessPolicy>,
}

impl Tools {
    /// Create a new Tools instance with the given context and an
    /// allow-everything policy.
    pub fn new(context: Arc<RwLock<Context>>) -> Self {
        Self::with_policy(context, Arc::new(AllowAll))
    }

    /// Create a new Tools instance with an explicit access policy.
    pub fn with_policy(context: Arc<RwLock<Context>>, policy: Arc<dyn AccessPolicy>) -> Self {
        Self { context, policy }
    }

    async fn handle(&self, workspace_root: Option<&str>) -> Result<WorkspaceHandle> {
        let context = self.context.read().await;
        context.handle_for(workspace_root.map(Path::new))
    }

    fn ensure_access(&self, actor: &str, scope: &ScopeId) -> Result<()> {
        if self.policy.can_access(actor, scope) {
            Ok(())
        } else {
            Err(Error::AccessDenied {
                actor: actor.to_string(),
                scope: scope.to_string(),
            })
        }
    }

    /// Check the policy against the scope owning `id`, when the directory
    /// knows it. Unknown ids fall through to the store's own validation.
    async fn ensure_access_for(
        &self,
        handle: &WorkspaceHandle,
        actor: &str,
        id: RequirementId,
    ) -> Result<()> {
        if let Some(entity) = handle.directory.get_entity(&id).await? {
            self.ensure_access(actor, &entity.scope_id)?;
        }
        Ok(())
    }

    /// Set the workspace context.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace path is invalid or has no
    /// `.reqtrace/` directory.
    pub async fn set_context(&self, workspace_root: &str) -> Result<SetContextResponse> {
        let path = Path::new(workspace_root);
        let mut context = self.context.write().await;
        let info = context.set_workspace(path).await?;

        Ok(SetContextResponse {
            workspace_root: info.workspace_root.display().to_string(),
            data_path: info.data_path.display().to_string(),
            message: "Context set successfully".to_string(),
        })
    }

    /// Get current workspace information.
    ///
    /// # Errors
    ///
    /// This function does not currently return errors but returns `Result`
    /// for API consistency.
    pub async fn where_am_i(&self) -> Result<WhereAmIResponse> {
        let context = self.context.read().await;

        match context.current_workspace() {
            Some(workspace) => Ok(WhereAmIResponse {
                workspace_root: Some(workspace.display().to_string()),
                data_path: context.current_data_path().map(|p| p.display().to_string()),
                context_set: true,
            }),
            None => Ok(WhereAmIResponse {
                workspace_root: None,
                data_path: None,
                context_set: false,
            }),
        }
    }

    /// Register (or retitle) a requirement in the workspace directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set, ids fail to parse, or the
    /// caller is not authorized for the scope.
    pub async fn register_requirement(
        &self,
        requirement_id: Option<&str>,
        title: String,
        organization_id: &str,
        actor: Option<String>,
        workspace_root: Option<&str>,
    ) -> Result<RegisterRequirementResponse> {
        let scope = parse_scope_id(organization_id)?;
        let id = match requirement_id {
            Some(raw) => parse_requirement_id("requirement_id", raw)?,
            None => RequirementId::random(),
        };
        let actor = actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string());

        let handle = self.handle(workspace_root).await?;
        self.ensure_access(&actor, &scope)?;

        handle
            .directory
            .upsert(EntityRecord {
                id,
                title: title.clone(),
                scope_id: scope,
                is_deleted: false,
            })
            .await;
        handle.store.read().await.save().await?;

        Ok(RegisterRequirementResponse {
            requirement_id: id.to_string(),
            title,
            organization_id: scope.to_string(),
        })
    }

    /// Create a parent-child relationship.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set, ids fail to parse, the caller
    /// is not authorized, or the store rejects the edge.
    pub async fn create_relationship(
        &self,
        parent_id: &str,
        child_id: &str,
        actor: Option<String>,
        workspace_root: Option<&str>,
    ) -> Result<RelationshipResponse> {
        let parent = parse_requirement_id("parent_id", parent_id)?;
        let child = parse_requirement_id("child_id", child_id)?;
        let actor = actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string());

        let handle = self.handle(workspace_root).await?;
        self.ensure_access_for(&handle, &actor, parent).await?;
        self.ensure_access_for(&handle, &actor, child).await?;

        let mut store = handle.store.write().await;
        let outcome = store.create_relationship(parent, child, &actor).await?;
        store.save().await?;

        Ok(RelationshipResponse {
            parent_id: parent.to_string(),
            child_id: child.to_string(),
            rows_touched: outcome.rows_touched,
            message: if outcome.rows_touched == 0 {
                "Relationship already existed".to_string()
            } else {
                "Relationship created".to_string()
            },
        })
    }

    /// Delete a parent-child relationship.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set, ids fail to parse, the caller
    /// is not authorized, or the edge does not exist.
    pub async fn delete_relationship(
        &self,
        parent_id: &str,
        child_id: &str,
        actor: Option<String>,
        workspace_root: Option<&str>,
    ) -> Result<RelationshipResponse> {
        let parent = parse_requirement_id("parent_id", parent_id)?;
        let child = parse_requirement_id("child_id", child_id)?;
        let actor = actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string());

        let handle = self.handle(workspace_root).await?;
        self.ensure_access_for(&handle, &actor, parent).await?;
        self.ensure_access_for(&handle, &actor, child).await?;

        let mut store = handle.store.write().await;
        let outcome = store.delete_relationship(parent, child, &actor).await?;
        store.save().await?;

        Ok(RelationshipResponse {
            parent_id: parent.to_string(),
            child_id: child.to_string(),
            rows_touched: outcome.rows_touched,
            message: "Relationship deleted".to_string(),
        })
    }

    /// Check whether a proposed edge would close a cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set, ids fail to parse, the caller
    /// is not authorized, or either requirement is unknown.
    pub async fn validate_cycle(
        &self,
        ancestor_id: &str,
        descendant_id: &str,
        max_depth: Option<usize>,
        actor: Option<String>,
        workspace_root: Option<&str>,
    ) -> Result<ValidateCycleResponse> {
        let ancestor = parse_requirement_id("ancestor_id", ancestor_id)?;
        let descendant = parse_requirement_id("descendant_id", descendant_id)?;
        let actor = actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string());

        let handle = self.handle(workspace_root).await?;
        self.ensure_access_for(&handle, &actor, ancestor).await?;
        self.ensure_access_for(&handle, &actor, descendant).await?;
        let depth_bound = max_depth.unwrap_or(handle.config.cycle_check_depth);

        let store = handle.store.read().await;
        let check = store.would_cycle(ancestor, descendant, depth_bound).await?;

        let response = match check {
            CycleCheck::Acyclic => ValidateCycleResponse {
                valid: true,
                reason: None,
                offending_ancestor: None,
            },
            CycleCheck::WouldCycle if ancestor == descendant => ValidateCycleResponse {
                valid: false,
                reason: Some("a requirement cannot be its own parent".to_string()),
                offending_ancestor: None,
            },
            CycleCheck::WouldCycle => {
                // Surface the closure entry that already places the proposed
                // descendant above the proposed ancestor.
                let offending = store
                    .query_hierarchy(ancestor, Direction::Ancestors, depth_bound)
                    .await?
                    .into_iter()
                    .find(|entry| entry.id == descendant)
                    .map(McpHierarchyEntry::from);
                ValidateCycleResponse {
                    valid: false,
                    reason: Some(
                        "the proposed child is already an ancestor of the proposed parent"
                            .to_string(),
                    ),
                    offending_ancestor: offending,
                }
            }
            CycleCheck::DepthExceeded => ValidateCycleResponse {
                valid: false,
                reason: Some(format!(
                    "hierarchy depth bound of {depth_bound} exceeded; rejected fail-closed"
                )),
                offending_ancestor: None,
            },
        };
        Ok(response)
    }

    /// Query the reachable set around one requirement.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set, arguments fail to parse, the
    /// caller is not authorized, or the requirement is unknown.
    pub async fn query_hierarchy(
        &self,
        requirement_id: &str,
        direction: Option<&str>,
        max_depth: Option<usize>,
        actor: Option<String>,
        workspace_root: Option<&str>,
    ) -> Result<QueryHierarchyResponse> {
        let id = parse_requirement_id("requirement_id", requirement_id)?;
        let direction = match direction {
            Some(raw) => parse_direction(raw).ok_or(Error::InvalidArgument {
                field: "direction",
                value: raw.to_string(),
                valid_values: "ancestors, descendants, both",
            })?,
            None => Direction::Both,
        };
        let actor = actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string());

        let handle = self.handle(workspace_root).await?;
        self.ensure_access_for(&handle, &actor, id).await?;
        let depth = max_depth.unwrap_or(handle.config.default_query_depth);

        let store = handle.store.read().await;
        let entries = store.query_hierarchy(id, direction, depth).await?;

        Ok(QueryHierarchyResponse {
            requirement_id: id.to_string(),
            direction: direction_to_string(direction),
            max_depth: depth,
            total: entries.len(),
            entries: entries.into_iter().map(Into::into).collect(),
        })
    }

    /// Reconstruct the requirement forest for one scope.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set, the scope fails to parse, or
    /// the caller is not authorized.
    pub async fn build_tree(
        &self,
        organization_id: &str,
        actor: Option<String>,
        workspace_root: Option<&str>,
    ) -> Result<TreeResponse> {
        let scope = parse_scope_id(organization_id)?;
        let actor = actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string());

        let handle = self.handle(workspace_root).await?;
        self.ensure_access(&actor, &scope)?;

        let store = handle.store.read().await;
        let view = store.build_tree(&scope).await?;

        let total_nodes = view.nodes.len();
        let root_count = view.nodes.iter().filter(|n| n.depth == 0).count();
        let orphan_count = view
            .nodes
            .iter()
            .filter(|n| n.depth == 0 && !n.has_children)
            .count();
        let max_depth = view.nodes.iter().map(|n| n.depth).max().unwrap_or(0);

        // Childless isolated roots are counted but not displayed.
        let nodes: Vec<McpTreeNode> = view
            .nodes
            .into_iter()
            .filter(|n| n.has_children || n.depth > 0)
            .map(Into::into)
            .collect();
        let hierarchy_view = render_hierarchy_view(&nodes);

        Ok(TreeResponse {
            hierarchy_view,
            nodes,
            total_nodes,
            root_count,
            orphan_count,
            max_depth,
            warnings: view.warnings.iter().map(warning_to_string).collect(),
        })
    }

    /// Create a trace link.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set, arguments fail to parse, the
    /// caller is not authorized, or the link is a rejected duplicate.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_link(
        &self,
        source_id: &str,
        source_type: Option<String>,
        target_id: &str,
        target_type: Option<String>,
        link_type: String,
        description: Option<String>,
        bidirectional: Option<bool>,
        custom_properties: Option<serde_json::Map<String, serde_json::Value>>,
        force: Option<bool>,
        actor: Option<String>,
        workspace_root: Option<&str>,
    ) -> Result<McpTraceLink> {
        let source = parse_uuid("source_id", source_id)?;
        let target = parse_uuid("target_id", target_id)?;
        let source_type = source_type.unwrap_or_else(|| REQUIREMENT_KIND.to_string());
        let target_type = target_type.unwrap_or_else(|| REQUIREMENT_KIND.to_string());
        let actor = actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string());

        let handle = self.handle(workspace_root).await?;
        // Only requirement endpoints resolve through the directory; other
        // entity kinds are owned by the surrounding application.
        if source_type == REQUIREMENT_KIND {
            self.ensure_access_for(&handle, &actor, RequirementId::from(source))
                .await?;
        }
        if target_type == REQUIREMENT_KIND {
            self.ensure_access_for(&handle, &actor, RequirementId::from(target))
                .await?;
        }

        let new_link = NewTraceLink {
            source_id: source,
            source_type,
            target_id: target,
            target_type,
            link_type,
            description: description.unwrap_or_default(),
            bidirectional: bidirectional.unwrap_or(false),
            custom_properties: custom_properties.unwrap_or_default(),
            force: force.unwrap_or(false),
        };

        let mut store = handle.store.write().await;
        let link = store.create_link(new_link, &actor).await?;
        store.save().await?;
        Ok(link.into())
    }

    /// List links touching one entity.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set, arguments fail to parse, or
    /// the caller is not authorized for the entity's scope.
    pub async fn list_links(
        &self,
        entity_id: &str,
        role: Option<&str>,
        link_type: Option<String>,
        include_deleted: Option<bool>,
        actor: Option<String>,
        workspace_root: Option<&str>,
    ) -> Result<Vec<McpTraceLink>> {
        let entity = parse_uuid("entity_id", entity_id)?;
        let role = match role {
            Some(raw) => parse_role(raw).ok_or(Error::InvalidArgument {
                field: "role",
                value: raw.to_string(),
                valid_values: "source, target, either",
            })?,
            None => LinkRole::Either,
        };
        let actor = actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string());

        let handle = self.handle(workspace_root).await?;
        self.ensure_access_for(&handle, &actor, RequirementId::from(entity))
            .await?;
        let filter = LinkFilter {
            link_type,
            include_deleted: include_deleted.unwrap_or(false),
        };

        let store = handle.store.read().await;
        let links = store.list_links(entity, role, &filter).await?;
        Ok(links.into_iter().map(Into::into).collect())
    }

    /// Soft-delete a trace link.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set, the id fails to parse, the
    /// caller is not authorized for either endpoint, or the link does not
    /// exist.
    pub async fn delete_link(
        &self,
        link_id: &str,
        actor: Option<String>,
        workspace_root: Option<&str>,
    ) -> Result<McpTraceLink> {
        let id = LinkId::parse(link_id).map_err(|_| Error::InvalidArgument {
            field: "link_id",
            value: link_id.to_string(),
            valid_values: "a UUID",
        })?;
        let actor = actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string());

        let handle = self.handle(workspace_root).await?;
        let mut store = handle.store.write().await;
        let existing = store
            .get_link(&id)
            .await?
            .ok_or(Error::Store(reqtrace::error::Error::LinkNotFound(id)))?;
        self.ensure_access_for(&handle, &actor, RequirementId::from(existing.source_id))
            .await?;
        self.ensure_access_for(&handle, &actor, RequirementId::from(existing.target_id))
            .await?;

        let link = store.delete_link(&id, &actor).await?;
        store.save().await?;
        Ok(link.into())
    }

    /// Build the traceability matrix for one scope.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set, the scope fails to parse, or
    /// the caller is not authorized.
    pub async fn trace_matrix(
        &self,
        organization_id: &str,
        actor: Option<String>,
        workspace_root: Option<&str>,
    ) -> Result<MatrixResponse> {
        let scope = parse_scope_id(organization_id)?;
        let actor = actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string());

        let handle = self.handle(workspace_root).await?;
        self.ensure_access(&actor, &scope)?;

        let store = handle.store.read().await;
        let matrix = store.link_matrix(&scope).await?;

        Ok(MatrixResponse {
            total_requirements: matrix.requirements.len(),
            total_links: matrix.links.len(),
            orphan_count: matrix.orphan_count,
            coverage_percentage: matrix.coverage_percentage,
            requirements: matrix
                .requirements
                .into_iter()
                .map(|row| McpMatrixRow {
                    id: row.id.to_string(),
                    title: row.title,
                    parent_count: row.parent_count,
                    child_count: row.child_count,
                    total_links: row.total_links,
                })
                .collect(),
            links: matrix.links.into_iter().map(Into::into).collect(),
        })
    }
}

fn parse_requirement_id(field: &'static str, value: &str) -> Result<RequirementId> {
    RequirementId::parse(value).map_err(|_| Error::InvalidArgument {
        field,
        value: value.to_string(),
        valid_values: "a UUID",
    })
}

fn parse_scope_id(value: &str) -> Result<ScopeId> {
    ScopeId::parse(value).map_err(|_| Error::InvalidArgument {
        field: "organization_id",
        value: value.to_string(),
        valid_values: "a UUID",
    })
}

fn parse_uuid(field: &'static str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|_| Error::InvalidArgument {
        field,
        value: value.to_string(),
        valid_values: "a UUID",
    })
}

fn render_hierarchy_view(nodes: &[McpTreeNode]) -> Vec<String> {
    nodes
        .iter()
        .map(|node| {
            if node.depth == 0 {
                format!("ROOT: {}", node.title)
            } else {
                format!("{}+-- {}", "  ".repeat(node.depth), node.title)
            }
        })
        .collect()
}

fn warning_to_string(warning: &IntegrityWarning) -> String {
    match warning {
        IntegrityWarning::CycleDetected {
            requirement_id,
            path,
        } => format!("cycle detected at {requirement_id} (path: {path})"),
        IntegrityWarning::MissingEntity { requirement_id } => {
            format!("edge references unknown requirement {requirement_id}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqtrace::storage::in_memory::new_in_memory_store;
    use std::path::PathBuf;

    struct Harness {
        tools: Tools,
        directory: Arc<reqtrace::entities::InMemoryDirectory>,
        scope: ScopeId,
    }

    async fn harness() -> Harness {
        let (context, directory) = shared_context();
        Harness {
            tools: Tools::new(context),
            directory,
            scope: ScopeId::random(),
        }
    }

    struct DenyAll;

    impl AccessPolicy for DenyAll {
        fn can_access(&self, _actor: &str, _scope: &ScopeId) -> bool {
            false
        }
    }

    /// Policy admitting exactly one scope.
    struct OnlyScope(ScopeId);

    impl AccessPolicy for OnlyScope {
        fn can_access(&self, _actor: &str, scope: &ScopeId) -> bool {
            *scope == self.0
        }
    }

    fn shared_context() -> (
        Arc<RwLock<Context>>,
        Arc<reqtrace::entities::InMemoryDirectory>,
    ) {
        let directory = Arc::new(reqtrace::entities::InMemoryDirectory::new());
        let shared: Arc<dyn EntityDirectory> = directory.clone();
        let store = new_in_memory_store(shared);

        let mut context = Context::new();
        context.set_test_workspace(PathBuf::from("/test/workspace"), store, Arc::clone(&directory));
        (Arc::new(RwLock::new(context)), directory)
    }

    async fn register(h: &Harness, title: &str) -> RequirementId {
        let response = h
            .tools
            .register_requirement(None, title.to_string(), &h.scope.to_string(), None, None)
            .await
            .unwrap();
        RequirementId::parse(&response.requirement_id).unwrap()
    }

    #[tokio::test]
    async fn register_then_relate_then_query() {
        let h = harness().await;
        let parent = register(&h, "REQ-001").await;
        let child = register(&h, "REQ-002").await;

        let created = h
            .tools
            .create_relationship(&parent.to_string(), &child.to_string(), None, None)
            .await
            .unwrap();
        assert_eq!(created.rows_touched, 1);

        let response = h
            .tools
            .query_hierarchy(&child.to_string(), Some("ancestors"), None, None, None)
            .await
            .unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.entries[0].title, "REQ-001");
        assert!(response.entries[0].direct);
    }

    #[tokio::test]
    async fn validate_cycle_reports_the_offending_ancestor() {
        let h = harness().await;
        let parent = register(&h, "REQ-001").await;
        let child = register(&h, "REQ-002").await;
        h.tools
            .create_relationship(&parent.to_string(), &child.to_string(), None, None)
            .await
            .unwrap();

        let ok = h
            .tools
            .validate_cycle(&child.to_string(), &RequirementId::random().to_string(), None, None, None)
            .await;
        // Unknown descendant is rejected outright
        assert!(ok.is_err());

        let response = h
            .tools
            .validate_cycle(&child.to_string(), &parent.to_string(), None, None, None)
            .await
            .unwrap();
        assert!(!response.valid);
        let offending = response.offending_ancestor.unwrap();
        assert_eq!(offending.id, parent.to_string());
        assert_eq!(offending.title, "REQ-001");
    }

    #[tokio::test]
    async fn build_tree_renders_and_filters_orphans() {
        let h = harness().await;
        let root = register(&h, "R1").await;
        let child = register(&h, "R1a").await;
        let _orphan = register(&h, "LONER").await;

        h.tools
            .create_relationship(&root.to_string(), &child.to_string(), None, None)
            .await
            .unwrap();

        let tree = h
            .tools
            .build_tree(&h.scope.to_string(), None, None)
            .await
            .unwrap();
        assert_eq!(tree.total_nodes, 3);
        assert_eq!(tree.root_count, 2);
        assert_eq!(tree.orphan_count, 1);
        assert_eq!(tree.max_depth, 1);
        // The childless loner is not displayed
        assert_eq!(tree.nodes.len(), 2);
        assert_eq!(tree.hierarchy_view, vec!["ROOT: R1", "  +-- R1a"]);
        assert!(tree.warnings.is_empty());
    }

    #[tokio::test]
    async fn link_tools_roundtrip() {
        let h = harness().await;
        let req = register(&h, "REQ-001").await;
        let test_case = Uuid::new_v4();

        let link = h
            .tools
            .create_link(
                &req.to_string(),
                None,
                &test_case.to_string(),
                Some("test".into()),
                "validates".into(),
                Some("covered by integration suite".into()),
                None,
                None,
                None,
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(link.version, 1);

        let listed = h
            .tools
            .list_links(&req.to_string(), Some("source"), None, None, None, None)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        let deleted = h.tools.delete_link(&link.id, None, None).await.unwrap();
        assert!(deleted.is_deleted);

        let matrix = h
            .tools
            .trace_matrix(&h.scope.to_string(), None, None)
            .await
            .unwrap();
        assert_eq!(matrix.total_requirements, 1);
        assert_eq!(matrix.orphan_count, 1);
    }

    #[tokio::test]
    async fn invalid_arguments_are_rejected() {
        let h = harness().await;

        let err = h
            .tools
            .query_hierarchy("not-a-uuid", None, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { field: "requirement_id", .. }));

        let id = register(&h, "REQ-001").await;
        let err = h
            .tools
            .query_hierarchy(&id.to_string(), Some("sideways"), None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { field: "direction", .. }));
    }

    #[tokio::test]
    async fn no_context_is_reported() {
        let tools = Tools::new(Arc::new(RwLock::new(Context::new())));
        let err = tools
            .query_hierarchy(&RequirementId::random().to_string(), None, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoContext));

        let info = tools.where_am_i().await.unwrap();
        assert!(!info.context_set);
    }

    #[tokio::test]
    async fn deny_all_policy_blocks_scoped_reads_and_link_ops() {
        let (context, _directory) = shared_context();
        let open = Tools::new(Arc::clone(&context));
        let guarded = Tools::with_policy(Arc::clone(&context), Arc::new(DenyAll));

        let scope = ScopeId::random();
        let registered = open
            .register_requirement(None, "REQ-001".into(), &scope.to_string(), None, None)
            .await
            .unwrap();
        let id = registered.requirement_id;
        let link = open
            .create_link(
                &id,
                None,
                &Uuid::new_v4().to_string(),
                Some("test".into()),
                "validates".into(),
                None,
                None,
                None,
                None,
                None,
                None,
            )
            .await
            .unwrap();

        let err = guarded
            .query_hierarchy(&id, None, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AccessDenied { .. }));

        let err = guarded
            .validate_cycle(&id, &id, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AccessDenied { .. }));

        let err = guarded
            .list_links(&id, None, None, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AccessDenied { .. }));

        let err = guarded.delete_link(&link.id, None, None).await.unwrap_err();
        assert!(matches!(err, Error::AccessDenied { .. }));

        // The open handle still reads fine against the same context
        assert!(open.query_hierarchy(&id, None, None, None, None).await.is_ok());
    }

    #[tokio::test]
    async fn relationships_require_access_to_both_endpoint_scopes() {
        let (context, directory) = shared_context();
        let home = ScopeId::random();
        let away = ScopeId::random();
        let tools = Tools::with_policy(context, Arc::new(OnlyScope(home)));

        let parent = RequirementId::random();
        let child = RequirementId::random();
        directory
            .upsert(EntityRecord {
                id: parent,
                title: "REQ-001".into(),
                scope_id: home,
                is_deleted: false,
            })
            .await;
        directory
            .upsert(EntityRecord {
                id: child,
                title: "OTHER-001".into(),
                scope_id: away,
                is_deleted: false,
            })
            .await;

        let err = tools
            .create_relationship(&parent.to_string(), &child.to_string(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AccessDenied { .. }));

        // Same-scope pair passes the policy
        let sibling = RequirementId::random();
        directory
            .upsert(EntityRecord {
                id: sibling,
                title: "REQ-002".into(),
                scope_id: home,
                is_deleted: false,
            })
            .await;
        tools
            .create_relationship(&parent.to_string(), &sibling.to_string(), None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn soft_deleted_requirements_stay_in_the_directory() {
        let h = harness().await;
        let id = register(&h, "REQ-001").await;
        h.directory.soft_delete(&id).await;

        let err = h
            .tools
            .query_hierarchy(&id.to_string(), None, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(reqtrace::error::Error::NotFound(_))));
    }
}
