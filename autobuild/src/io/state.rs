//! Crash-durable persistence of build-loop resume state.
//!
//! State is written after every feature outcome with a temp-file-then-rename
//! pattern, so a crash mid-write never exposes a partial file to the next
//! reader. serde handles escaping: branch names containing quotes or
//! backslashes must round-trip exactly.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::OrchestratorError;

/// How far the last run got. Owned exclusively by the build loop.
///
/// Lifecycle: created on the first feature outcome, overwritten on each
/// subsequent one, deleted on full successful completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResumeState {
    /// Index into the topological order of the current pass.
    pub feature_index: usize,
    /// Strategy of the pass in flight (`chained`, `sequential`, `independent`).
    pub branch_strategy: String,
    /// Names of features recorded as built, in completion order. Authoritative
    /// for resume: these are never re-attempted.
    pub completed_features: Vec<String>,
    pub current_branch: String,
    /// ISO-8601 UTC write time.
    pub timestamp: String,
}

impl ResumeState {
    pub fn new(
        feature_index: usize,
        branch_strategy: &str,
        completed_features: Vec<String>,
        current_branch: &str,
    ) -> Self {
        Self {
            feature_index,
            branch_strategy: branch_strategy.to_string(),
            completed_features,
            current_branch: current_branch.to_string(),
            timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

/// Read persisted state.
///
/// `Ok(None)` means a fresh run. A file that exists but fails to parse is an
/// [`OrchestratorError::InvalidState`]: the operator decides, the run never
/// silently restarts from zero.
pub fn read_state(path: &Path) -> Result<Option<ResumeState>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read state {}", path.display()))?;
    let state = serde_json::from_str(&contents).map_err(|err| OrchestratorError::InvalidState {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    debug!(path = %path.display(), "resume state loaded");
    Ok(Some(state))
}

/// Atomically write state to disk (temp file + rename).
pub fn write_state(path: &Path, state: &ResumeState) -> Result<()> {
    debug!(
        path = %path.display(),
        feature_index = state.feature_index,
        completed = state.completed_features.len(),
        "writing resume state"
    );
    let mut buf = serde_json::to_string_pretty(state).context("serialize resume state")?;
    buf.push('\n');

    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))?;
    Ok(())
}

/// Remove state, used on full successful completion. Missing state is fine.
pub fn clear_state(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove state {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("resume.json");
        let state = ResumeState::new(
            3,
            "independent",
            vec!["login".to_string(), "signup".to_string()],
            "autobuild/signup",
        );

        write_state(&path, &state).expect("write");
        let loaded = read_state(&path).expect("read").expect("state present");
        assert_eq!(loaded, state);
    }

    #[test]
    fn round_trips_quotes_and_backslashes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("resume.json");
        let state = ResumeState::new(
            1,
            "strategy \"quoted\"",
            vec!["feature with \\ and \"".to_string()],
            "branch-\"name\"\\end",
        );

        write_state(&path, &state).expect("write");
        let loaded = read_state(&path).expect("read").expect("state present");
        assert_eq!(loaded, state);
    }

    #[test]
    fn missing_file_means_fresh_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(read_state(&temp.path().join("missing.json")).expect("read"), None);
    }

    #[test]
    fn corrupt_file_is_a_typed_error_not_a_fresh_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("resume.json");
        fs::write(&path, "{ not json").expect("seed corrupt state");

        let err = read_state(&path).unwrap_err();
        assert!(
            err.downcast_ref::<OrchestratorError>()
                .is_some_and(|e| matches!(e, OrchestratorError::InvalidState { .. }))
        );
    }

    #[test]
    fn clear_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("resume.json");
        clear_state(&path).expect("clear missing");
        write_state(&path, &ResumeState::new(0, "chained", Vec::new(), "main")).expect("write");
        clear_state(&path).expect("clear");
        assert!(!path.exists());
        clear_state(&path).expect("clear again");
    }
}
