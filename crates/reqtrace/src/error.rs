//! Error types for the reqtrace engine.

use crate::domain::{LinkId, RequirementId};
use thiserror::Error;

/// Errors reported by the traceability engine.
///
/// Validation errors (`NotFound`, `InvalidInput`, `CycleDetected`,
/// `AlreadyHasParent`, `AlreadyExists`, `AuthorizationDenied`) are final and
/// must not be retried. `Contention` is safe to retry with backoff.
/// `IntegrityViolation` indicates a prior bug and is logged at high severity
/// where it is detected.
#[derive(Debug, Error)]
pub enum Error {
    /// The requirement does not exist or is soft-deleted.
    #[error("Requirement not found: {0}")]
    NotFound(RequirementId),

    /// No direct edge exists between the given pair.
    #[error("Relationship not found: {parent} -> {child}")]
    RelationshipNotFound {
        /// The parent side of the missing edge.
        parent: RequirementId,
        /// The child side of the missing edge.
        child: RequirementId,
    },

    /// The trace link does not exist.
    #[error("Trace link not found: {0}")]
    LinkNotFound(LinkId),

    /// Malformed or out-of-range input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Inserting the edge would violate acyclicity (or its chain would
    /// exceed the configured depth bound, which is rejected fail-closed).
    #[error("Relationship {parent} -> {child} would create a cycle")]
    CycleDetected {
        /// The proposed parent.
        parent: RequirementId,
        /// The proposed child.
        child: RequirementId,
    },

    /// The child already has a different direct parent (forest invariant).
    #[error("Requirement {child} already has parent {existing_parent}")]
    AlreadyHasParent {
        /// The child whose parent slot is taken.
        child: RequirementId,
        /// Its current direct parent.
        existing_parent: RequirementId,
    },

    /// An identical (source, target, link_type) trace link already exists.
    #[error("Trace link already exists: {0}")]
    AlreadyExists(LinkId),

    /// An impossible state was observed (e.g. a cycle during tree build).
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    /// Lock or transaction timeout; safe to retry with backoff.
    #[error("Operation timed out waiting for the store lock")]
    Contention,

    /// The caller's actor is not allowed to touch the scope.
    #[error("Access denied for actor '{actor}'")]
    AuthorizationDenied {
        /// The rejected actor.
        actor: String,
    },

    /// Backend-specific storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the caller may retry the failed operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention)
    }
}

/// A specialized Result type for reqtrace operations.
pub type Result<T> = std::result::Result<T, Error>;
