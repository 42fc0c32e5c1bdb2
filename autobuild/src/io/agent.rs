//! Agent invocation boundary.
//!
//! The [`Agent`] trait decouples orchestration from the actual coding-agent
//! backend (currently the `claude` CLI). Tests use scripted agents that
//! return predetermined outputs without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::core::types::AgentInvocation;
use crate::io::process::run_with_timeout;

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    /// Prompt text, passed as the final command argument.
    pub prompt: String,
    /// Hard wall-clock timeout for the subprocess.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Append a usage record here after each call. `None` disables logging.
    pub cost_log_path: Option<PathBuf>,
}

/// Abstraction over coding-agent backends.
///
/// `Sync` so the validation coordinator can share one agent across its
/// worker pool; implementations hold no per-call mutable state.
pub trait Agent: Sync {
    fn invoke(&self, request: &InvokeRequest) -> Result<AgentInvocation>;
}

/// Agent backed by the `claude` CLI in JSON output mode.
#[derive(Debug, Clone)]
pub struct ClaudeAgent {
    /// Command prefix, e.g. `["claude", "-p", "--dangerously-skip-permissions"]`.
    pub command: Vec<String>,
}

impl ClaudeAgent {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

/// Subset of the CLI's JSON response the orchestrator consumes.
#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    result: Option<String>,
    total_cost_usd: Option<f64>,
    #[serde(default)]
    usage: ClaudeUsage,
    duration_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ClaudeUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

impl Agent for ClaudeAgent {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn invoke(&self, request: &InvokeRequest) -> Result<AgentInvocation> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("empty agent command"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .args(["--output-format", "json"])
            .arg(&request.prompt)
            .current_dir(&request.workdir)
            // Prevent nested-session detection inside the child agent.
            .env_remove("CLAUDECODE");

        info!(program, "invoking agent");
        let started = Instant::now();
        let output = run_with_timeout(cmd, request.timeout, request.output_limit_bytes)
            .context("run agent command")?;
        let duration = started.elapsed();

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "agent timed out");
            return Ok(AgentInvocation {
                raw_output: combine(&stdout, &stderr),
                exit_code: output.status.code(),
                duration,
                timed_out: true,
                cost_usd: None,
                input_tokens: None,
                output_tokens: None,
            });
        }

        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent exited non-zero");
            return Ok(AgentInvocation {
                raw_output: combine(&stdout, &stderr),
                exit_code: output.status.code(),
                duration,
                timed_out: false,
                cost_usd: None,
                input_tokens: None,
                output_tokens: None,
            });
        }

        let invocation = match serde_json::from_str::<ClaudeResponse>(&stdout) {
            Ok(response) => {
                let raw_output = match response.result {
                    Some(result) => result,
                    None => {
                        warn!("agent JSON response has no result field");
                        stdout
                    }
                };
                AgentInvocation {
                    raw_output,
                    exit_code: Some(0),
                    duration,
                    timed_out: false,
                    cost_usd: response.total_cost_usd,
                    input_tokens: response.usage.input_tokens,
                    output_tokens: response.usage.output_tokens,
                }
            }
            Err(err) => {
                warn!(err = %err, "agent returned non-JSON output");
                AgentInvocation {
                    raw_output: stdout,
                    exit_code: Some(0),
                    duration,
                    timed_out: false,
                    cost_usd: None,
                    input_tokens: None,
                    output_tokens: None,
                }
            }
        };

        if let Some(cost_log) = &request.cost_log_path {
            if let Err(err) = append_cost_record(cost_log, &invocation) {
                warn!(err = %err, "failed to write cost log");
            }
        }

        debug!(cost_usd = ?invocation.cost_usd, "agent invocation finished");
        Ok(invocation)
    }
}

fn combine(stdout: &str, stderr: &str) -> String {
    let mut combined = String::with_capacity(stdout.len() + stderr.len() + 1);
    combined.push_str(stdout);
    if !stderr.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(stderr);
    }
    combined
}

/// Append one JSONL usage record. Creates parent directories as needed.
fn append_cost_record(path: &Path, invocation: &AgentInvocation) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create cost log dir {}", parent.display()))?;
    }
    let record = json!({
        "timestamp": Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        "cost_usd": invocation.cost_usd,
        "input_tokens": invocation.input_tokens,
        "output_tokens": invocation.output_tokens,
        "duration_ms": invocation.duration.as_millis() as u64,
    });
    let mut line = record.to_string();
    line.push('\n');

    use std::io::Write;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open cost log {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append cost log {}", path.display()))?;
    Ok(())
}
