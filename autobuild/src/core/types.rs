//! Shared deterministic types for the orchestration core.
//!
//! These types define stable contracts between components. They carry no I/O
//! handles and must remain deterministic across runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Roadmap status of a feature, parsed from the status column glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureStatus {
    /// ⬜ — not yet built, eligible for scheduling.
    Pending,
    /// ✅ — recorded as done in the roadmap; never re-enters the pending set.
    Completed,
    /// 🔄 / ⏸️ / ❌ / anything else — not scheduled by this engine.
    Skipped,
}

/// One unit of work from the roadmap. Immutable once read into a build run.
///
/// Identity is the feature name, which must be unique within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub id: u32,
    pub name: String,
    /// Free-text pointer to the implementation area (roadmap `Source` column).
    pub source: String,
    pub complexity: String,
    pub dependency_ids: Vec<u32>,
    pub status: FeatureStatus,
}

/// Raw record of one agent subprocess call.
///
/// Created fresh per call and consumed immediately; never persisted beyond
/// the per-feature log and the cost log.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentInvocation {
    /// The agent-observable text output (the channel signals are parsed from).
    pub raw_output: String,
    /// Exit code of the subprocess, `None` if killed by signal.
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub timed_out: bool,
    pub cost_usd: Option<f64>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// Classified result of one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Retryable: rate limiting, credit exhaustion, overload.
    TransientFailure(String),
    /// Non-retryable: unexpected non-zero exit with no transient marker.
    FatalFailure(String),
    /// The hard wall-clock timeout expired. Retryable.
    Timeout,
}

impl Outcome {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Outcome::TransientFailure(_) | Outcome::Timeout)
    }
}
