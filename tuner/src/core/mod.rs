//! Pure, deterministic harness logic.
//!
//! No I/O lives here: documents, merges, lint checks, marker scans, and
//! advisor heuristics are all plain data transformations, fully testable in
//! isolation.

pub mod advisor;
pub mod document;
pub mod layer;
pub mod lint;
pub mod markers;
pub mod merge;
pub mod summary;
pub mod types;
