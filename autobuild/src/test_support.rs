//! Shared helpers for unit and integration tests.
//!
//! Available to other crates via the `test-support` feature; inside this
//! crate it is compiled for tests only.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use crate::core::types::{AgentInvocation, Feature, FeatureStatus};
use crate::io::agent::{Agent, InvokeRequest};

/// Build a pending feature with the given dependencies.
pub fn feature(id: u32, name: &str, dependency_ids: &[u32]) -> Feature {
    Feature {
        id,
        name: name.to_string(),
        source: format!("src/{name}"),
        complexity: "M".to_string(),
        dependency_ids: dependency_ids.to_vec(),
        status: FeatureStatus::Pending,
    }
}

/// One canned agent response replayed by [`ScriptedAgent`].
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub raw_output: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

/// Agent that replays a fixed sequence of responses without spawning
/// processes. Panics on exhaustion only via the returned error, so tests can
/// assert over-invocation.
pub struct ScriptedAgent {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    calls: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Exit 0 with the given output.
    pub fn success(raw_output: &str) -> ScriptedResponse {
        ScriptedResponse {
            raw_output: raw_output.to_string(),
            exit_code: Some(0),
            timed_out: false,
        }
    }

    /// Non-zero exit with the given output.
    pub fn failure(exit_code: i32, raw_output: &str) -> ScriptedResponse {
        ScriptedResponse {
            raw_output: raw_output.to_string(),
            exit_code: Some(exit_code),
            timed_out: false,
        }
    }

    /// Hard-timeout response.
    pub fn timeout() -> ScriptedResponse {
        ScriptedResponse {
            raw_output: String::new(),
            exit_code: None,
            timed_out: true,
        }
    }

    /// Number of invocations made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Agent for ScriptedAgent {
    fn invoke(&self, _request: &InvokeRequest) -> Result<AgentInvocation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .responses
            .lock()
            .map_err(|_| anyhow!("scripted agent mutex poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow!("scripted agent invoked more times than scripted"))?;
        Ok(AgentInvocation {
            raw_output: response.raw_output,
            exit_code: response.exit_code,
            duration: Duration::from_millis(1),
            timed_out: response.timed_out,
            cost_usd: None,
            input_tokens: None,
            output_tokens: None,
        })
    }
}

/// Initialize a git repository with one empty commit on `main`.
pub fn init_git_repo(dir: &Path) -> Result<()> {
    for args in [
        vec!["init", "--initial-branch=main"],
        vec!["config", "user.email", "test@example.com"],
        vec!["config", "user.name", "Test"],
        vec!["commit", "--allow-empty", "-m", "initial"],
    ] {
        let output = Command::new("git")
            .args(&args)
            .current_dir(dir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
    }
    Ok(())
}

/// A roadmap table in the format the parser expects.
pub fn roadmap_table(rows: &[(u32, &str, &[u32], &str)]) -> String {
    let mut text = String::from(
        "| ID | Feature | Source | Spec | Complexity | Dependencies | Status |\n\
         |----|---------|--------|------|------------|--------------|--------|\n",
    );
    for (id, name, deps, status) in rows {
        let deps_cell = if deps.is_empty() {
            "-".to_string()
        } else {
            deps.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        text.push_str(&format!(
            "| {id} | {name} | src/{name} | specs/{name}.md | M | {deps_cell} | {status} |\n"
        ));
    }
    text
}

/// A minimal valid feature spec with frontmatter.
pub fn spec_markdown(name: &str) -> String {
    format!("---\nfeature: {name}\ndomain: demo\n---\n\n# {name}\n\nBuild {name}.\n")
}
