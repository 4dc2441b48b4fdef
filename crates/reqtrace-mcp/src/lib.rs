//! MCP server for reqtrace requirement traceability.
//!
//! This crate provides an MCP (Model Context Protocol) server that exposes
//! reqtrace hierarchy and trace-link functionality to AI assistants.
//!
//! # Architecture
//!
//! The server uses the `rmcp` crate for MCP protocol handling and directly
//! wraps the `RelationStore` trait from the reqtrace crate.
//!
//! # Tools
//!
//! ## Context Management
//! - `set_context` - Set the workspace root for all operations
//! - `where_am_i` - Show current workspace context
//!
//! ## Requirements and Hierarchy
//! - `register_requirement` - Register a requirement in the workspace
//! - `create_relationship` - Create a parent-child relationship
//! - `delete_relationship` - Delete a parent-child relationship
//! - `validate_cycle` - Check a proposed relationship for cycles
//! - `query_hierarchy` - Ancestors/descendants with depth metadata
//! - `build_tree` - Reconstruct the full forest for an organization
//!
//! ## Trace Links
//! - `create_link` - Link two entities (requirement, test, document...)
//! - `list_links` - List links touching an entity
//! - `delete_link` - Soft-delete a link
//! - `trace_matrix` - Coverage matrix for an organization

pub mod context;
pub mod error;
pub mod models;
pub mod server;
pub mod tools;

pub use error::{Error, Result};
pub use server::ReqtraceMcpServer;
