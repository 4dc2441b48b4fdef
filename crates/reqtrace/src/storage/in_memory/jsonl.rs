//! JSONL snapshot persistence for the in-memory store.
//!
//! The snapshot file holds one JSON record per line, tagged by `kind`:
//! requirement entities, direct edges and trace links. Only direct edges are
//! persisted; the closure is rebuilt on load by replaying every edge through
//! the same validation path as live mutations, so a hand-edited or corrupted
//! file can never smuggle a cycle or a second parent into the store.
//!
//! Loading is resilient: malformed lines and invalid edges are skipped and
//! reported as [`LoadWarning`]s instead of failing the whole load.

use crate::domain::{DirectEdge, EntityRecord, RequirementId, TraceLink};
use crate::entities::InMemoryDirectory;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::inner::InMemoryStoreInner;
use super::{InMemoryStore, StoreState, LOCK_TIMEOUT};
use crate::config::DEFAULT_CYCLE_CHECK_DEPTH;
use crate::storage::RelationStore;

/// One line of the snapshot file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum SnapshotRecord {
    Requirement(EntityRecord),
    Edge(DirectEdge),
    Link(TraceLink),
}

/// Non-fatal finding from loading a snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadWarning {
    /// A line was not valid JSON or not a known record shape.
    #[error("line {line}: {message}")]
    MalformedLine {
        /// 1-based line number.
        line: usize,
        /// Parse error text.
        message: String,
    },

    /// An edge references a requirement the snapshot does not define.
    #[error("edge {parent} -> {child} references an unknown requirement")]
    UnknownEntity {
        /// Parent endpoint.
        parent: RequirementId,
        /// Child endpoint.
        child: RequirementId,
    },

    /// An edge failed validation during replay (cycle or second parent).
    #[error("edge {parent} -> {child} rejected: {message}")]
    InvalidEdge {
        /// Parent endpoint.
        parent: RequirementId,
        /// Child endpoint.
        child: RequirementId,
        /// Rejection reason.
        message: String,
    },
}

/// Load a snapshot file, repopulating the directory and rebuilding the
/// closure by edge replay.
///
/// The directory's previous contents are discarded. Invalid records are
/// skipped and reported; the returned store holds everything that survived
/// validation.
///
/// # Errors
///
/// Returns `Error::Io` if the file cannot be read at all.
pub async fn load_from_jsonl(
    path: &Path,
    directory: Arc<InMemoryDirectory>,
) -> Result<(Box<dyn RelationStore>, Vec<LoadWarning>)> {
    let contents = tokio::fs::read_to_string(path).await?;

    let mut warnings = Vec::new();
    let mut entities = Vec::new();
    let mut edges = Vec::new();
    let mut links = Vec::new();

    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SnapshotRecord>(line) {
            Ok(SnapshotRecord::Requirement(entity)) => entities.push(entity),
            Ok(SnapshotRecord::Edge(edge)) => edges.push(edge),
            Ok(SnapshotRecord::Link(link)) => links.push(link),
            Err(error) => warnings.push(LoadWarning::MalformedLine {
                line: index + 1,
                message: error.to_string(),
            }),
        }
    }

    directory.clear().await;
    let mut titles: HashMap<RequirementId, String> = HashMap::new();
    for entity in entities {
        titles.insert(entity.id, entity.title.clone());
        directory.upsert(entity).await;
    }

    let store: InMemoryStore = Arc::new(StoreState {
        state: Mutex::new(InMemoryStoreInner::new(directory, DEFAULT_CYCLE_CHECK_DEPTH)),
        lock_timeout: LOCK_TIMEOUT,
    });
    {
        let mut inner = store.state.lock().await;
        for edge in edges {
            let (Some(parent_title), Some(child_title)) =
                (titles.get(&edge.parent_id), titles.get(&edge.child_id))
            else {
                warnings.push(LoadWarning::UnknownEntity {
                    parent: edge.parent_id,
                    child: edge.child_id,
                });
                continue;
            };
            if let Err(error) =
                inner.apply_edge(edge.parent_id, edge.child_id, parent_title, child_title)
            {
                warnings.push(LoadWarning::InvalidEdge {
                    parent: edge.parent_id,
                    child: edge.child_id,
                    message: error.to_string(),
                });
            }
        }
        for link in links {
            inner.links.insert(link.id, link);
        }
    }

    if !warnings.is_empty() {
        tracing::warn!(
            path = %path.display(),
            count = warnings.len(),
            "snapshot loaded with warnings"
        );
    }
    Ok((Box::new(store), warnings))
}

/// Write a snapshot atomically: serialize to a temp file in the same
/// directory, then rename over the target.
///
/// # Errors
///
/// Returns `Error::Io` on any filesystem failure, `Error::Json` if a record
/// fails to serialize.
pub async fn save_to_jsonl(snapshot: &crate::storage::Snapshot, path: &Path) -> Result<()> {
    let mut out = String::new();
    for entity in &snapshot.entities {
        out.push_str(&serde_json::to_string(&SnapshotRecord::Requirement(
            entity.clone(),
        ))?);
        out.push('\n');
    }
    for edge in &snapshot.edges {
        out.push_str(&serde_json::to_string(&SnapshotRecord::Edge(*edge))?);
        out.push('\n');
    }
    for link in &snapshot.links {
        out.push_str(&serde_json::to_string(&SnapshotRecord::Link(link.clone()))?);
        out.push('\n');
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("jsonl.tmp");
    tokio::fs::write(&tmp, out).await?;
    tokio::fs::rename(&tmp, path).await?;
    tracing::debug!(path = %path.display(), "snapshot saved");
    Ok(())
}
