//! Typed error hierarchy for orchestration failures.
//!
//! Errors propagate through `anyhow::Result`; callers that need to branch on
//! a specific condition (exit codes, resumability reporting) downcast to
//! [`OrchestratorError`].

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Another live instance holds the lock. Fatal, no retry, no side effects.
    #[error("another instance is already running (pid {pid}); lock file: {path}")]
    LockContention { pid: u32, path: PathBuf },

    /// The roadmap dependency graph has a cycle. Fatal precondition failure:
    /// no agent work is attempted.
    #[error("circular dependency detected in roadmap: {cycle}")]
    CircularDependency { cycle: String },

    /// A persisted state file exists but cannot be parsed. Treated as "no
    /// resumable state" only after the operator is told explicitly.
    #[error("resume state {path} is unreadable ({reason}); fix or delete it to start fresh")]
    InvalidState { path: PathBuf, reason: String },

    /// A transient failure survived every retry. The run halts resumably.
    #[error("transient agent failure persisted after {attempts} attempts: {reason}")]
    RetriesExhausted { attempts: u32, reason: String },

    /// The agent failed in a way that retrying cannot fix.
    #[error("fatal agent failure: {reason}")]
    FatalAgentFailure { reason: String },
}
