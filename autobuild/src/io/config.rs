//! Orchestrator configuration stored under `.autobuild/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Build configuration (TOML).
///
/// Constructed once and passed into the build loop; there is no ambient
/// global configuration. Missing fields default to sensible values so the
/// file stays hand-editable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Cap on features built per run; 0 means unlimited.
    pub max_features_per_run: u32,

    /// Run drift validation after an independent-strategy pass.
    pub drift_check: bool,

    /// Hard wall-clock timeout for one agent invocation, in seconds.
    pub agent_timeout_secs: u64,

    /// Retries after the initial attempt on transient failures.
    pub max_retries: u32,

    /// First backoff delay in seconds; doubles per retry.
    pub backoff_base_secs: u64,

    /// Upper bound on a single backoff delay in seconds.
    pub backoff_cap_secs: u64,

    /// Token budget for spec documents included in agent prompts.
    pub context_budget_tokens: usize,

    /// Truncate captured agent output beyond this many bytes.
    pub agent_output_limit_bytes: usize,

    /// Agent command prefix; the prompt is appended as the final argument.
    pub agent_command: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_features_per_run: 0,
            drift_check: true,
            agent_timeout_secs: 600,
            max_retries: 5,
            backoff_base_secs: 1,
            backoff_cap_secs: 60,
            context_budget_tokens: 100_000,
            agent_output_limit_bytes: 1_000_000,
            agent_command: vec![
                "claude".to_string(),
                "-p".to_string(),
                "--dangerously-skip-permissions".to_string(),
            ],
        }
    }
}

impl BuildConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent_timeout_secs == 0 {
            return Err(anyhow!("agent_timeout_secs must be > 0"));
        }
        if self.backoff_cap_secs < self.backoff_base_secs {
            return Err(anyhow!("backoff_cap_secs must be >= backoff_base_secs"));
        }
        if self.context_budget_tokens == 0 {
            return Err(anyhow!("context_budget_tokens must be > 0"));
        }
        if self.agent_output_limit_bytes == 0 {
            return Err(anyhow!("agent_output_limit_bytes must be > 0"));
        }
        if self.agent_command.is_empty() || self.agent_command[0].trim().is_empty() {
            return Err(anyhow!("agent_command must be a non-empty array"));
        }
        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_secs(self.backoff_cap_secs)
    }
}

/// Load config from a TOML file. Missing file means defaults.
pub fn load_config(path: &Path) -> Result<BuildConfig> {
    if !path.exists() {
        let cfg = BuildConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BuildConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &BuildConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');

    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
