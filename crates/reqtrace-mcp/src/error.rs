//! Error types for the reqtrace MCP server.

use thiserror::Error;

/// Errors that can occur in the reqtrace MCP server.
#[derive(Debug, Error)]
pub enum Error {
    /// No workspace context has been set.
    #[error("No workspace context set. Call set_context first.")]
    NoContext,

    /// Invalid argument value provided.
    #[error("Invalid {field}: '{value}'. Valid values: {valid_values}")]
    InvalidArgument {
        /// The field name that had an invalid value.
        field: &'static str,
        /// The invalid value that was provided.
        value: String,
        /// Description of valid values.
        valid_values: &'static str,
    },

    /// The specified workspace was not found or path is invalid.
    #[error("Workspace not found: {path}")]
    WorkspaceNotFound {
        /// The path that was not found.
        path: String,
        /// The underlying IO error, if any.
        #[source]
        source: Option<std::io::Error>,
    },

    /// Workspace exists but was not initialized via `set_context`.
    #[error("Workspace not initialized: {0}. Call set_context first.")]
    WorkspaceNotInitialized(String),

    /// Failed to discover a reqtrace workspace.
    #[error("No .reqtrace directory found in {0} or parent directories")]
    NoReqtraceDirectory(String),

    /// The workspace configuration could not be loaded.
    #[error("Failed to load config from {path}: {reason}")]
    ConfigLoad {
        /// The config file path.
        path: String,
        /// Why loading failed.
        reason: String,
    },

    /// The caller is not authorized for the requested scope.
    #[error("Actor '{actor}' is not authorized for scope {scope}")]
    AccessDenied {
        /// The acting identity.
        actor: String,
        /// The scope that was denied.
        scope: String,
    },

    /// An error from the reqtrace engine.
    #[error("Store error: {0}")]
    Store(#[from] reqtrace::error::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for reqtrace MCP operations.
pub type Result<T> = std::result::Result<T, Error>;
