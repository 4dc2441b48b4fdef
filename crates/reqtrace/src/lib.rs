//! Reqtrace - a requirement traceability engine.
//!
//! This crate maintains the hierarchical structure of requirements as a
//! forest with a materialized transitive closure, giving O(1)-per-row
//! ancestor/descendant queries, incremental closure patches on edge
//! mutation, cycle-safe validation and ordered tree reconstruction. A
//! separate flat trace-link store covers non-hierarchical relationships
//! (requirement-to-test, requirement-to-document and so on).

#![forbid(unsafe_code)]

// Public modules for library usage
pub mod config;
pub mod domain;
pub mod entities;
pub mod error;
pub mod storage;
