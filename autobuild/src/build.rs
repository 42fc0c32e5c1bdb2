//! The top-level build loop.
//!
//! A run acquires the project lock, schedules pending roadmap features in
//! dependency order, and drives one agent invocation per feature, persisting
//! resume state after every outcome. Runs are resumable: a halted or crashed
//! run picks up exactly where the previous one stopped.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::core::graph::{check_acyclic, topological_order};
use crate::core::roadmap::parse_roadmap;
use crate::core::signal::{format_signal, parse_signal};
use crate::core::truncate::truncate_for_context;
use crate::core::types::{Feature, Outcome};
use crate::errors::OrchestratorError;
use crate::io::agent::{Agent, InvokeRequest};
use crate::io::config::{BuildConfig, load_config};
use crate::io::git::Git;
use crate::io::layout::{ProjectPaths, slugify};
use crate::io::lock::BuildLock;
use crate::io::retry::{InvocationReport, RetryPolicy, invoke_with_backoff};
use crate::io::spec_file::read_validated_spec;
use crate::io::state::{ResumeState, clear_state, read_state, write_state};
use crate::validate::run_drift_validation;

/// How feature work maps onto git branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchStrategy {
    /// All features on one run branch, committed in sequence.
    Chained,
    /// Each feature on a new branch forked from the previous one.
    Sequential,
    /// Each feature on its own branch forked from the base branch.
    /// Followed by drift validation.
    Independent,
    /// A chained pass, then an independent pass.
    Both,
}

impl BranchStrategy {
    /// Concrete passes this strategy expands to.
    pub fn passes(self) -> Vec<BranchStrategy> {
        match self {
            BranchStrategy::Both => vec![BranchStrategy::Chained, BranchStrategy::Independent],
            other => vec![other],
        }
    }
}

impl fmt::Display for BranchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BranchStrategy::Chained => "chained",
            BranchStrategy::Sequential => "sequential",
            BranchStrategy::Independent => "independent",
            BranchStrategy::Both => "both",
        };
        f.write_str(name)
    }
}

impl FromStr for BranchStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chained" => Ok(BranchStrategy::Chained),
            "sequential" => Ok(BranchStrategy::Sequential),
            "independent" => Ok(BranchStrategy::Independent),
            "both" => Ok(BranchStrategy::Both),
            other => Err(anyhow!(
                "unknown strategy '{other}' (expected chained, sequential, independent or both)"
            )),
        }
    }
}

/// Caller-supplied knobs for one run. `None` means use the config value.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub strategy: BranchStrategy,
    pub max_features: Option<u32>,
    pub drift_check: Option<bool>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            strategy: BranchStrategy::Chained,
            max_features: None,
            drift_check: None,
        }
    }
}

/// Terminal result of a run that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Every scheduled feature built; resume state cleared.
    Completed { features_built: usize },
    /// The per-run feature cap stopped the run; resume state kept.
    CapReached { features_built: usize },
    /// A feature failed fatally or never signalled completion; state kept.
    HaltedForRetry { feature: String, reason: String },
    /// Post-build drift validation failed for these features.
    DriftDetected { failing: Vec<String> },
}

enum PassResult {
    Finished,
    CapReached,
    Halted { feature: String, reason: String },
}

/// Run one build to completion, halt, or cap.
#[instrument(skip_all, fields(strategy = %options.strategy))]
pub fn run_build<A: Agent>(agent: &A, root: &Path, options: &BuildOptions) -> Result<BuildOutcome> {
    let paths = ProjectPaths::new(root);
    paths.ensure_dirs()?;

    let mut config = load_config(&paths.config_path)?;
    if let Some(cap) = options.max_features {
        config.max_features_per_run = cap;
    }
    if let Some(drift) = options.drift_check {
        config.drift_check = drift;
    }

    let lock = BuildLock::acquire(&paths.lock_path)?;

    let roadmap_text = fs::read_to_string(&paths.roadmap_path)
        .with_context(|| format!("read roadmap {}", paths.roadmap_path.display()))?;
    let features = parse_roadmap(&roadmap_text)?;
    // Cycles fail the run before any agent is invoked.
    check_acyclic(&features)?;

    let state = read_state(&paths.state_path)?;
    let git = Git::new(root);

    let mut passes = options.strategy.passes();
    let mut resume = state;
    if let Some(resumed) = &resume {
        let Some(position) = passes
            .iter()
            .position(|pass| pass.to_string() == resumed.branch_strategy)
        else {
            bail!(
                "resume state is for strategy '{}' but this run uses '{}'; \
                 clear {} or rerun with the matching strategy",
                resumed.branch_strategy,
                options.strategy,
                paths.state_path.display()
            );
        };
        passes.drain(..position);
        info!(
            pass = %resumed.branch_strategy,
            completed = resumed.completed_features.len(),
            "resuming interrupted run"
        );
    }

    let mut features_built = 0usize;
    let total_passes = passes.len();
    for (pass_number, pass) in passes.into_iter().enumerate() {
        let pass_state = resume.take();
        let result = run_pass(
            agent,
            &paths,
            &config,
            &git,
            &features,
            pass,
            pass_state,
            &mut features_built,
        )?;
        match result {
            PassResult::Finished => {
                if pass_number + 1 < total_passes {
                    // Point resume at the next pass before starting it.
                    let base = git.current_branch()?;
                    let fresh =
                        ResumeState::new(0, &next_pass_name(pass_number, options), Vec::new(), &base);
                    write_state(&paths.state_path, &fresh)?;
                }
            }
            PassResult::CapReached => {
                return Ok(BuildOutcome::CapReached { features_built });
            }
            PassResult::Halted { feature, reason } => {
                return Ok(BuildOutcome::HaltedForRetry { feature, reason });
            }
        }
    }

    if config.drift_check
        && options
            .strategy
            .passes()
            .contains(&BranchStrategy::Independent)
    {
        let failing = run_drift_validation(agent, &paths, &config, &features);
        if !failing.is_empty() {
            warn!(failing = failing.len(), "drift validation failed");
            return Ok(BuildOutcome::DriftDetected { failing });
        }
    }

    clear_state(&paths.state_path)?;
    lock.release()?;
    info!(features_built, "build completed");
    Ok(BuildOutcome::Completed { features_built })
}

fn next_pass_name(current_pass_number: usize, options: &BuildOptions) -> String {
    options.strategy.passes()[current_pass_number + 1].to_string()
}

#[allow(clippy::too_many_arguments)]
fn run_pass<A: Agent>(
    agent: &A,
    paths: &ProjectPaths,
    config: &BuildConfig,
    git: &Git,
    features: &[Feature],
    pass: BranchStrategy,
    state: Option<ResumeState>,
    features_built: &mut usize,
) -> Result<PassResult> {
    let pass_name = pass.to_string();
    let mut completed: Vec<String> = state
        .as_ref()
        .map(|s| s.completed_features.clone())
        .unwrap_or_default();

    // Branch the pass operates from. Chained: the run branch. Sequential:
    // the most recent feature branch. Independent: the base branch.
    let mut anchor_branch = match &state {
        Some(s) => {
            git.checkout_branch(&s.current_branch)?;
            s.current_branch.clone()
        }
        None => match pass {
            BranchStrategy::Chained => {
                let run_branch = "autobuild/run".to_string();
                if git.branch_exists(&run_branch)? {
                    git.checkout_branch(&run_branch)?;
                } else {
                    git.checkout_new_branch(&run_branch)?;
                }
                run_branch
            }
            _ => git.current_branch()?,
        },
    };

    let order = topological_order(features)?;
    let pending: Vec<Feature> = order
        .into_iter()
        .filter(|feature| !completed.contains(&feature.name))
        .collect();

    info!(pass = %pass_name, pending = pending.len(), "starting pass");

    let policy = RetryPolicy {
        max_retries: config.max_retries,
        backoff_base: config.backoff_base(),
        backoff_cap: config.backoff_cap(),
    };

    for (index, feature) in pending.iter().enumerate() {
        if config.max_features_per_run > 0
            && *features_built >= config.max_features_per_run as usize
        {
            info!(cap = config.max_features_per_run, "feature cap reached");
            let snapshot = ResumeState::new(index, &pass_name, completed, &anchor_branch);
            write_state(&paths.state_path, &snapshot)?;
            return Ok(PassResult::CapReached);
        }

        let spec_path = paths.spec_path(&feature.name);
        let spec = read_validated_spec(&spec_path)?;
        let spec = truncate_for_context(&spec, config.context_budget_tokens);

        match pass {
            BranchStrategy::Chained => {}
            BranchStrategy::Sequential => {
                let branch = format!("autobuild/{}", slugify(&feature.name));
                if git.branch_exists(&branch)? {
                    git.checkout_branch(&branch)?;
                } else {
                    git.checkout_new_branch(&branch)?;
                }
                anchor_branch = branch;
            }
            BranchStrategy::Independent => {
                let branch = format!("autobuild/{}", slugify(&feature.name));
                if git.branch_exists(&branch)? {
                    git.checkout_branch(&branch)?;
                } else {
                    git.checkout_new_branch_from(&branch, &anchor_branch)?;
                }
            }
            BranchStrategy::Both => unreachable!("expanded before pass execution"),
        }

        info!(feature = %feature.name, index, "building feature");
        let request = InvokeRequest {
            workdir: paths.root.clone(),
            prompt: build_prompt(feature, &spec),
            timeout: config.agent_timeout(),
            output_limit_bytes: config.agent_output_limit_bytes,
            cost_log_path: Some(paths.cost_log_path.clone()),
        };

        let report = match invoke_with_backoff(agent, &request, &policy) {
            Ok(report) => report,
            Err(err) => {
                if err.downcast_ref::<OrchestratorError>().is_some() {
                    // Retries exhausted. Persist progress, then surface.
                    let snapshot = ResumeState::new(index, &pass_name, completed, &anchor_branch);
                    write_state(&paths.state_path, &snapshot)?;
                    return Err(err.context(format!(
                        "feature '{}' halted; state persisted, rerun to resume",
                        feature.name
                    )));
                }
                return Err(err);
            }
        };

        write_feature_log(paths, &feature.name, &report);

        if let Some(reason) = failure_reason(&report) {
            warn!(feature = %feature.name, reason = %reason, "feature halted");
            let snapshot = ResumeState::new(index, &pass_name, completed, &anchor_branch);
            write_state(&paths.state_path, &snapshot)?;
            return Ok(PassResult::Halted {
                feature: feature.name.clone(),
                reason,
            });
        }

        git.add_all()?;
        git.commit_staged(&format!("autobuild: {}", feature.name))?;
        if pass == BranchStrategy::Independent {
            git.checkout_branch(&anchor_branch)?;
        }

        completed.push(feature.name.clone());
        *features_built += 1;
        let snapshot = ResumeState::new(index + 1, &pass_name, completed.clone(), &anchor_branch);
        write_state(&paths.state_path, &snapshot)?;
        info!(feature = %feature.name, "feature built");
    }

    Ok(PassResult::Finished)
}

/// `None` when the feature succeeded: a successful exit AND an explicit
/// `IMPLEMENTATION_COMPLETE: true` signal. Anything weaker halts the run.
fn failure_reason(report: &InvocationReport) -> Option<String> {
    match &report.outcome {
        Outcome::Success => {
            match parse_signal("IMPLEMENTATION_COMPLETE", &report.invocation.raw_output).as_deref()
            {
                Some("true") => None,
                Some(value) => Some(format!("agent reported IMPLEMENTATION_COMPLETE: {value}")),
                None => Some("agent emitted no IMPLEMENTATION_COMPLETE signal".to_string()),
            }
        }
        Outcome::FatalFailure(reason) => Some(reason.clone()),
        // Retryable outcomes never escape invoke_with_backoff.
        Outcome::TransientFailure(reason) => Some(reason.clone()),
        Outcome::Timeout => Some("agent timed out".to_string()),
    }
}

fn build_prompt(feature: &Feature, spec: &str) -> String {
    format!(
        "Implement the feature `{name}` from the specification below. Work in \
         the current repository.\n\n\
         When the implementation is complete, update this feature's status to \
         \u{2705} in the roadmap and print a final line:\n\
         {done}\n\
         If you cannot complete it, print:\n\
         {failed}\n\n\
         Specification:\n\n{spec}\n",
        name = feature.name,
        done = format_signal("IMPLEMENTATION_COMPLETE", "true"),
        failed = format_signal("IMPLEMENTATION_COMPLETE", "false"),
    )
}

fn write_feature_log(paths: &ProjectPaths, feature_name: &str, report: &InvocationReport) {
    let path = paths.feature_log_path(feature_name);
    let body = format!(
        "outcome: {:?}\nattempts: {}\nexit_code: {:?}\nduration_ms: {}\n\n{}\n",
        report.outcome,
        report.attempts,
        report.invocation.exit_code,
        report.invocation.duration.as_millis(),
        report.invocation.raw_output,
    );
    if let Err(err) = fs::write(&path, body) {
        warn!(path = %path.display(), err = %err, "failed to write feature log");
    }
}
