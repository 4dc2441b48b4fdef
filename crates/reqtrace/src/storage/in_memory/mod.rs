//! In-memory relationship store.
//!
//! State lives in [`InMemoryStoreInner`](inner::InMemoryStoreInner) behind a
//! tokio mutex: a petgraph adjacency for the direct edges, the closure map
//! derived from them, and the trace-link table. The JSONL snapshot
//! persistence in [`jsonl`] reuses this backend and replays edges through
//! the same validation path as live mutations.

mod closure;
mod inner;
mod jsonl;
mod trait_impl;
mod tree;

pub use jsonl::{load_from_jsonl, save_to_jsonl, LoadWarning};

use crate::config::DEFAULT_CYCLE_CHECK_DEPTH;
use crate::entities::EntityDirectory;
use crate::storage::RelationStore;
use inner::InMemoryStoreInner;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Upper bound on waiting for the store mutex before reporting
/// [`Error::Contention`](crate::error::Error::Contention).
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// In-memory state behind one async mutex, together with the bounded wait
/// applied when acquiring it.
pub(crate) struct StoreState {
    pub(crate) state: Mutex<InMemoryStoreInner>,
    pub(crate) lock_timeout: Duration,
}

/// Shared handle to the in-memory state.
pub(crate) type InMemoryStore = Arc<StoreState>;

/// Create an empty in-memory store backed by the given entity directory.
#[must_use]
pub fn new_in_memory_store(directory: Arc<dyn EntityDirectory>) -> Box<dyn RelationStore> {
    Box::new(Arc::new(StoreState {
        state: Mutex::new(InMemoryStoreInner::new(directory, DEFAULT_CYCLE_CHECK_DEPTH)),
        lock_timeout: LOCK_TIMEOUT,
    }))
}
