//! Unattended build orchestration for AI coding agents.
//!
//! This crate drives a roadmap of features through one agent invocation per
//! feature until the roadmap is complete or the run halts. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (parsing, scheduling, signal
//!   extraction, outcome classification). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (locking, state persistence, git,
//!   agent subprocesses). Isolated to enable scripted agents in tests.
//!
//! Orchestration modules ([`build`], [`validate`]) coordinate core logic with
//! I/O to implement CLI commands.

pub mod build;
pub mod core;
pub mod errors;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
