//! Workspace context management for the MCP server.
//!
//! This module handles:
//! - Workspace detection (walking up to find `.reqtrace/`)
//! - Path canonicalization
//! - Per-workspace store/directory instance management
//!
//! # Lock Ordering
//!
//! When using `Context` with `Tools`, locks must be acquired in this order:
//! 1. `Context` read/write lock (via `Arc<RwLock<Context>>`)
//! 2. Store read/write lock (via the handle's `Arc<RwLock<Box<dyn RelationStore>>>`)
//!
//! Never attempt to acquire a context lock while holding a store lock.

use crate::error::{Error, Result};
use reqtrace::config::{ReqtraceConfig, CONFIG_FILE_NAME, REQTRACE_DIR_NAME};
use reqtrace::entities::InMemoryDirectory;
use reqtrace::storage::{create_store, RelationStore};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Maximum number of cached workspaces to prevent resource exhaustion.
///
/// When this limit is reached, the oldest workspace is evicted from cache.
const MAX_CACHED_WORKSPACES: usize = 32;

/// Everything a tool needs to operate on one workspace.
#[derive(Clone)]
pub struct WorkspaceHandle {
    /// The relationship/link store.
    pub store: Arc<RwLock<Box<dyn RelationStore>>>,

    /// The entity directory shared with the store.
    pub directory: Arc<InMemoryDirectory>,

    /// The workspace configuration (traversal bounds, storage wiring).
    pub config: ReqtraceConfig,
}

/// Global context state for the MCP server.
///
/// Manages workspace contexts and store instances for multi-workspace
/// support.
pub struct Context {
    /// The current active workspace root.
    current_workspace: Option<PathBuf>,

    /// Per-workspace handles (limited to [`MAX_CACHED_WORKSPACES`]).
    handle_cache: HashMap<PathBuf, WorkspaceHandle>,

    /// Per-workspace snapshot paths (discovered dynamically).
    data_paths: HashMap<PathBuf, PathBuf>,

    /// Insertion order for FIFO cache eviction.
    cache_order: VecDeque<PathBuf>,
}

impl Context {
    /// Create a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current_workspace: None,
            handle_cache: HashMap::new(),
            data_paths: HashMap::new(),
            cache_order: VecDeque::new(),
        }
    }

    /// Set the current workspace root.
    ///
    /// This will:
    /// 1. Canonicalize the path (resolves `..`, symlinks, validates existence)
    /// 2. Validate the path is safe (no null bytes, is absolute)
    /// 3. Verify a `.reqtrace/` directory exists
    /// 4. Create or retrieve a store instance
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace path doesn't exist, has no
    /// `.reqtrace/` directory, or if store creation fails.
    pub async fn set_workspace(&mut self, workspace_root: &Path) -> Result<WorkspaceInfo> {
        debug!(path = %workspace_root.display(), "Setting workspace");

        // Canonicalize to resolve symlinks and `..` (prevents path traversal)
        let canonical = workspace_root
            .canonicalize()
            .map_err(|e| Error::WorkspaceNotFound {
                path: workspace_root.display().to_string(),
                source: Some(e),
            })?;

        validate_path(&canonical)?;

        let reqtrace_dir = canonical.join(REQTRACE_DIR_NAME);
        if !reqtrace_dir.exists() {
            debug!(path = %reqtrace_dir.display(), "No .reqtrace directory found");
            return Err(Error::NoReqtraceDirectory(canonical.display().to_string()));
        }

        // Load config to get storage settings and traversal bounds
        let config_path = reqtrace_dir.join(CONFIG_FILE_NAME);
        let config = ReqtraceConfig::load(&config_path)
            .await
            .map_err(|e| Error::ConfigLoad {
                path: config_path.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!(backend = %config.storage.backend, "Loaded config");

        let backend = config.storage.to_backend(&canonical)?;
        let data_path = backend.data_path().map_or_else(
            || canonical.join(&config.storage.data_file),
            Path::to_path_buf,
        );
        debug!(data_path = %data_path.display(), "Snapshot path from backend");

        self.current_workspace = Some(canonical.clone());
        self.data_paths.insert(canonical.clone(), data_path.clone());

        if self.handle_cache.contains_key(&canonical) {
            debug!("Using cached store instance");
        } else {
            debug!("Creating new store instance");
            while self.handle_cache.len() >= MAX_CACHED_WORKSPACES {
                self.evict_oldest();
            }

            let directory = Arc::new(InMemoryDirectory::new());
            let store = create_store(backend, Arc::clone(&directory)).await?;
            self.handle_cache.insert(
                canonical.clone(),
                WorkspaceHandle {
                    store: Arc::new(RwLock::new(store)),
                    directory,
                    config,
                },
            );
            self.cache_order.push_back(canonical.clone());
        }

        Ok(WorkspaceInfo {
            workspace_root: canonical,
            data_path,
        })
    }

    /// Evict the oldest cached workspace to make room for new entries.
    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.cache_order.pop_front() {
            self.handle_cache.remove(&oldest);
            self.data_paths.remove(&oldest);
            tracing::debug!(workspace = %oldest.display(), "Evicted workspace from cache");
        }
    }

    /// Get the current workspace root.
    #[must_use]
    pub fn current_workspace(&self) -> Option<&PathBuf> {
        self.current_workspace.as_ref()
    }

    /// Get the snapshot path for the current workspace.
    #[must_use]
    pub fn current_data_path(&self) -> Option<&PathBuf> {
        self.current_workspace
            .as_ref()
            .and_then(|ws| self.data_paths.get(ws))
    }

    /// Get the handle for a specific workspace, or the current one if not
    /// specified.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No context is set and no workspace path is provided
    /// - The workspace path doesn't exist (with IO error context)
    /// - The workspace exists but wasn't initialized via `set_workspace()`
    pub fn handle_for(&self, workspace_root: Option<&Path>) -> Result<WorkspaceHandle> {
        let workspace = match workspace_root {
            Some(path) => path.canonicalize().map_err(|e| Error::WorkspaceNotFound {
                path: path.display().to_string(),
                source: Some(e),
            })?,
            None => self.current_workspace.clone().ok_or(Error::NoContext)?,
        };

        self.handle_cache
            .get(&workspace)
            .cloned()
            .ok_or_else(|| Error::WorkspaceNotInitialized(workspace.display().to_string()))
    }

    /// Discover and set the workspace by walking up from the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no `.reqtrace/` directory is found in the path
    /// hierarchy, or if store creation fails.
    pub async fn discover_and_set_workspace(&mut self, start: &Path) -> Result<WorkspaceInfo> {
        let workspace_root = discover_workspace(start)?;
        self.set_workspace(&workspace_root).await
    }

    /// Set up a workspace with an injected store for testing.
    ///
    /// This bypasses the normal store creation flow and cache eviction,
    /// allowing tests to inject in-memory stores without requiring a real
    /// `.reqtrace/` directory.
    #[cfg(test)]
    pub fn set_test_workspace(
        &mut self,
        workspace_root: PathBuf,
        store: Box<dyn RelationStore>,
        directory: Arc<InMemoryDirectory>,
    ) {
        self.current_workspace = Some(workspace_root.clone());
        self.data_paths
            .insert(workspace_root.clone(), PathBuf::from("test://memory"));
        self.handle_cache.insert(
            workspace_root.clone(),
            WorkspaceHandle {
                store: Arc::new(RwLock::new(store)),
                directory,
                config: ReqtraceConfig::default(),
            },
        );
        self.cache_order.push_back(workspace_root);
    }

    /// Get the number of cached workspaces (for testing).
    #[cfg(test)]
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.handle_cache.len()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Information about a workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceInfo {
    /// The canonical path to the workspace root.
    pub workspace_root: PathBuf,

    /// The path to the snapshot file.
    pub data_path: PathBuf,
}

/// Validate that a path is safe to use as a workspace.
///
/// # Security Checks
///
/// - Path must be absolute (canonicalization ensures this)
/// - Path must not contain null bytes
/// - Path components must not contain traversal attempts after
///   canonicalization
fn validate_path(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Workspace path must be absolute",
        )));
    }

    let path_str = path.to_string_lossy();
    if path_str.contains('\0') {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Workspace path contains invalid characters",
        )));
    }

    // After canonicalization, there should be no `..` components
    for component in path.components() {
        if let std::path::Component::ParentDir = component {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Workspace path contains parent directory references",
            )));
        }
    }

    Ok(())
}

/// Discover a reqtrace workspace by walking up from the given directory.
///
/// Returns the canonicalized workspace root (directory containing
/// `.reqtrace/`).
///
/// # Errors
///
/// Returns `Error::NoReqtraceDirectory` if no `.reqtrace/` directory is
/// found, or `Error::WorkspaceNotFound` if the path cannot be
/// canonicalized.
pub fn discover_workspace(start: &Path) -> Result<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let reqtrace_dir = current.join(REQTRACE_DIR_NAME);
        if reqtrace_dir.exists() && reqtrace_dir.is_dir() {
            // Canonicalize to resolve symlinks (e.g., /var -> /private/var)
            return current
                .canonicalize()
                .map_err(|e| Error::WorkspaceNotFound {
                    path: current.display().to_string(),
                    source: Some(e),
                });
        }

        if !current.pop() {
            break;
        }
    }

    Err(Error::NoReqtraceDirectory(start.display().to_string()))
}
