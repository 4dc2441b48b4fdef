//! Workspace configuration for reqtrace.
//!
//! A workspace is a directory containing `.reqtrace/` with a `config.yaml`
//! and the JSONL snapshot file. The configuration controls storage wiring
//! and the default traversal bounds.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Name of the reqtrace directory.
pub const REQTRACE_DIR_NAME: &str = ".reqtrace";

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Name of the snapshot data file.
pub const SNAPSHOT_FILE_NAME: &str = "trace.jsonl";

/// Default depth bound for hierarchy queries.
pub const DEFAULT_QUERY_DEPTH: usize = 10;

/// Default fail-closed depth bound for cycle validation.
pub const DEFAULT_CYCLE_CHECK_DEPTH: usize = 100;

/// Configuration file structure for a reqtrace workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReqtraceConfig {
    /// Storage configuration.
    pub storage: StorageConfig,

    /// Default `max_depth` for hierarchy queries.
    #[serde(default = "default_query_depth")]
    pub default_query_depth: usize,

    /// Fail-closed depth bound for cycle validation.
    #[serde(default = "default_cycle_check_depth")]
    pub cycle_check_depth: usize,
}

/// Storage configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Storage backend type ("jsonl" or "memory").
    pub backend: String,

    /// Path to the snapshot file, relative to the workspace root.
    pub data_file: String,
}

impl StorageConfig {
    /// Resolve the backend configuration against a workspace root.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for an unknown backend name.
    pub fn to_backend(&self, workspace_root: &Path) -> Result<crate::storage::StoreBackend> {
        match self.backend.as_str() {
            "jsonl" => Ok(crate::storage::StoreBackend::Jsonl(
                workspace_root.join(&self.data_file),
            )),
            "memory" => Ok(crate::storage::StoreBackend::InMemory),
            other => Err(Error::InvalidInput(format!(
                "unknown storage backend '{other}'"
            ))),
        }
    }
}

fn default_query_depth() -> usize {
    DEFAULT_QUERY_DEPTH
}

fn default_cycle_check_depth() -> usize {
    DEFAULT_CYCLE_CHECK_DEPTH
}

impl ReqtraceConfig {
    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        serde_yaml::from_str(&content).map_err(|e| Error::Storage(format!("config: {e}")))
    }

    /// Save configuration to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Storage(format!("config: {e}")))?;
        fs::write(path, content).await?;
        Ok(())
    }
}

impl Default for ReqtraceConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                backend: "jsonl".to_string(),
                data_file: format!("{REQTRACE_DIR_NAME}/{SNAPSHOT_FILE_NAME}"),
            },
            default_query_depth: DEFAULT_QUERY_DEPTH,
            cycle_check_depth: DEFAULT_CYCLE_CHECK_DEPTH,
        }
    }
}
