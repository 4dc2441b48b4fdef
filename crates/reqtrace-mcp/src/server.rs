//! MCP server implementation.
//!
//! This module contains the main server setup using rmcp.

use crate::context::Context;
use crate::models::{
    BuildTreeParams, CreateLinkParams, DeleteLinkParams, ListLinksParams, QueryHierarchyParams,
    RegisterRequirementParams, RelationshipParams, SetContextParams, TraceMatrixParams,
    ValidateCycleParams,
};
use crate::tools::Tools;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::transport::stdio;
use rmcp::{
    handler::server::ServerHandler, tool, tool_handler, tool_router, ErrorData as McpError,
    ServiceExt,
};
use std::sync::Arc;
use tokio::sync::RwLock;

/// The reqtrace MCP server.
///
/// Provides MCP protocol handling over stdio transport.
#[derive(Clone)]
pub struct ReqtraceMcpServer {
    /// Shared context for workspace management.
    context: Arc<RwLock<Context>>,
    /// Tool implementations.
    tools: Arc<Tools>,
    /// Tool router for MCP dispatch.
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ReqtraceMcpServer {
    /// Set the workspace context for subsequent operations.
    #[tool(
        description = "Set the workspace root directory for all subsequent operations. Call this first before using other tools."
    )]
    async fn set_context(
        &self,
        Parameters(params): Parameters<SetContextParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.tools.set_context(&params.workspace_root).await {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    /// Get current workspace context information.
    #[tool(description = "Show current workspace context and snapshot path. Useful for debugging.")]
    async fn where_am_i(&self) -> Result<CallToolResult, McpError> {
        match self.tools.where_am_i().await {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    /// Register a requirement in the workspace.
    #[tool(
        description = "Register a requirement (id, title, organization) so it can participate in hierarchy relationships and trace links."
    )]
    async fn register_requirement(
        &self,
        Parameters(params): Parameters<RegisterRequirementParams>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .tools
            .register_requirement(
                params.requirement_id.as_deref(),
                params.title,
                &params.organization_id,
                params.actor,
                params.workspace_root.as_deref(),
            )
            .await
        {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    /// Create a parent-child relationship between two requirements.
    #[tool(
        description = "Create a parent-child relationship between two requirements. Validates cycles and the single-parent rule; updates the transitive closure incrementally."
    )]
    async fn create_relationship(
        &self,
        Parameters(params): Parameters<RelationshipParams>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .tools
            .create_relationship(
                &params.parent_id,
                &params.child_id,
                params.actor,
                params.workspace_root.as_deref(),
            )
            .await
        {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    /// Delete a parent-child relationship.
    #[tool(
        description = "Delete a direct parent-child relationship, removing every transitive pair whose path crossed it."
    )]
    async fn delete_relationship(
        &self,
        Parameters(params): Parameters<RelationshipParams>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .tools
            .delete_relationship(
                &params.parent_id,
                &params.child_id,
                params.actor,
                params.workspace_root.as_deref(),
            )
            .await
        {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    /// Check whether a proposed relationship would create a cycle.
    #[tool(
        description = "Check whether a proposed parent-child relationship would create a circular dependency, without modifying anything."
    )]
    async fn validate_cycle(
        &self,
        Parameters(params): Parameters<ValidateCycleParams>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .tools
            .validate_cycle(
                &params.ancestor_id,
                &params.descendant_id,
                params.max_depth,
                params.actor,
                params.workspace_root.as_deref(),
            )
            .await
        {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    /// Query ancestors and/or descendants of a requirement.
    #[tool(
        description = "Query the ancestors and/or descendants of a requirement with depth and directness metadata. Directions: ancestors, descendants, both."
    )]
    async fn query_hierarchy(
        &self,
        Parameters(params): Parameters<QueryHierarchyParams>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .tools
            .query_hierarchy(
                &params.requirement_id,
                params.direction.as_deref(),
                params.max_depth,
                params.actor,
                params.workspace_root.as_deref(),
            )
            .await
        {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    /// Reconstruct the requirement tree for an organization.
    #[tool(
        description = "Reconstruct the full requirement forest for an organization, ordered by path, with a human-readable hierarchy view and statistics."
    )]
    async fn build_tree(
        &self,
        Parameters(params): Parameters<BuildTreeParams>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .tools
            .build_tree(
                &params.organization_id,
                params.actor,
                params.workspace_root.as_deref(),
            )
            .await
        {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    /// Create a trace link between two entities.
    #[tool(
        description = "Create a traceability link between two entities (requirement, test, document...). Duplicate (source, target, type) links are rejected unless force is set."
    )]
    async fn create_link(
        &self,
        Parameters(params): Parameters<CreateLinkParams>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .tools
            .create_link(
                &params.source_id,
                params.source_type,
                &params.target_id,
                params.target_type,
                params.link_type,
                params.description,
                params.bidirectional,
                params.custom_properties,
                params.force,
                params.actor,
                params.workspace_root.as_deref(),
            )
            .await
        {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    /// List trace links touching an entity.
    #[tool(
        description = "List trace links touching an entity, newest first. Roles: source, target, either. Soft-deleted links are hidden unless include_deleted is set."
    )]
    async fn list_links(
        &self,
        Parameters(params): Parameters<ListLinksParams>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .tools
            .list_links(
                &params.entity_id,
                params.role.as_deref(),
                params.link_type,
                params.include_deleted,
                params.actor,
                params.workspace_root.as_deref(),
            )
            .await
        {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    /// Soft-delete a trace link.
    #[tool(description = "Soft-delete a trace link. The row is retained for audit with a bumped version.")]
    async fn delete_link(
        &self,
        Parameters(params): Parameters<DeleteLinkParams>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .tools
            .delete_link(
                &params.link_id,
                params.actor,
                params.workspace_root.as_deref(),
            )
            .await
        {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    /// Generate the traceability matrix for an organization.
    #[tool(
        description = "Generate a traceability matrix for an organization: per-requirement link counts, orphans and coverage percentage."
    )]
    async fn trace_matrix(
        &self,
        Parameters(params): Parameters<TraceMatrixParams>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .tools
            .trace_matrix(
                &params.organization_id,
                params.actor,
                params.workspace_root.as_deref(),
            )
            .await
        {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }
}

impl ReqtraceMcpServer {
    /// Create a new reqtrace MCP server.
    #[must_use]
    pub fn new() -> Self {
        let context = Arc::new(RwLock::new(Context::new()));
        let tools = Arc::new(Tools::new(Arc::clone(&context)));

        Self {
            context,
            tools,
            tool_router: Self::tool_router(),
        }
    }

    /// Get a reference to the context.
    #[must_use]
    pub fn context(&self) -> &Arc<RwLock<Context>> {
        &self.context
    }

    /// Serve the MCP protocol over stdio until the client disconnects.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to start or the session
    /// terminates abnormally.
    pub async fn run(self) -> anyhow::Result<()> {
        let service = self.serve(stdio()).await?;
        service.waiting().await?;
        Ok(())
    }
}

impl Default for ReqtraceMcpServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for ReqtraceMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "reqtrace-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Reqtrace MCP server for requirement traceability. Call set_context first to set the workspace."
                    .into(),
            ),
        }
    }
}
