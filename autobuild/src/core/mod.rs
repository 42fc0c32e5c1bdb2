//! Pure, deterministic orchestration logic.
//!
//! Nothing in this tree performs I/O; every function takes values and returns
//! values so each component is testable in isolation.

pub mod backoff;
pub mod classifier;
pub mod graph;
pub mod roadmap;
pub mod signal;
pub mod truncate;
pub mod types;
