//! Drift validation: do the built sources still match their specs?
//!
//! After an independent-strategy pass, every feature is checked by a
//! read-only agent invocation that compares the feature spec against the
//! implementation and reports a `DRIFT_DETECTED` signal. Checks are
//! independent, so they run on a bounded worker pool.

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::signal::parse_signal;
use crate::core::truncate::truncate_for_context;
use crate::core::types::Feature;
use crate::io::agent::{Agent, InvokeRequest};
use crate::io::config::BuildConfig;
use crate::io::layout::ProjectPaths;

/// One spec-versus-implementation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftPair {
    pub feature_name: String,
    pub spec_path: PathBuf,
    /// Roadmap `Source` column: where the implementation lives.
    pub source_reference: String,
}

/// Pairs for every feature with a concrete source reference.
///
/// A `-` source means the roadmap declares no implementation location, so
/// there is nothing to compare against.
pub fn drift_pairs(features: &[Feature], paths: &ProjectPaths) -> Vec<DriftPair> {
    features
        .iter()
        .filter(|feature| feature.source.trim() != "-" && !feature.source.trim().is_empty())
        .map(|feature| DriftPair {
            feature_name: feature.name.clone(),
            spec_path: paths.spec_path(&feature.name),
            source_reference: feature.source.clone(),
        })
        .collect()
}

/// Worker count for a batch: machine parallelism, capped by the batch size.
pub fn default_workers(pair_count: usize) -> usize {
    let parallelism = thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get);
    parallelism.min(pair_count.max(1))
}

/// Run `check` over all pairs on `workers` threads.
///
/// Returns the names of failing pairs in input order. A check that errors
/// counts as failing; the error is logged, never swallowed silently.
pub fn run_parallel<F>(pairs: &[DriftPair], workers: usize, check: F) -> Vec<String>
where
    F: Fn(&DriftPair) -> Result<bool> + Sync,
{
    if pairs.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, pairs.len());
    let cursor = AtomicUsize::new(0);
    let failed: Mutex<Vec<usize>> = Mutex::new(Vec::new());

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(pair) = pairs.get(index) else { break };
                    let passed = match check(pair) {
                        Ok(passed) => passed,
                        Err(err) => {
                            warn!(feature = %pair.feature_name, err = %err, "drift check errored");
                            false
                        }
                    };
                    if !passed {
                        if let Ok(mut failed) = failed.lock() {
                            failed.push(index);
                        }
                    }
                }
            });
        }
    });

    let mut indices = failed.into_inner().unwrap_or_default();
    indices.sort_unstable();
    indices
        .into_iter()
        .map(|index| pairs[index].feature_name.clone())
        .collect()
}

/// One read-only drift check via the agent.
///
/// Passes only when the agent reports `DRIFT_DETECTED: false`. A missing or
/// malformed signal fails the check.
#[instrument(skip_all, fields(feature = %pair.feature_name))]
pub fn check_drift_with_agent<A: Agent>(
    agent: &A,
    paths: &ProjectPaths,
    config: &BuildConfig,
    pair: &DriftPair,
) -> Result<bool> {
    let spec = std::fs::read_to_string(&pair.spec_path)
        .with_context(|| format!("read spec {}", pair.spec_path.display()))?;
    let spec = truncate_for_context(&spec, config.context_budget_tokens);

    let prompt = format!(
        "Compare the feature specification below against its implementation at \
         `{source}`. Do NOT modify any files; this is a read-only review.\n\n\
         Report your conclusion as a single line:\n\
         DRIFT_DETECTED: true\n\
         or\n\
         DRIFT_DETECTED: false\n\n\
         Specification for feature `{name}`:\n\n{spec}\n",
        source = pair.source_reference,
        name = pair.feature_name,
    );

    let request = InvokeRequest {
        workdir: paths.root.clone(),
        prompt,
        timeout: config.agent_timeout(),
        output_limit_bytes: config.agent_output_limit_bytes,
        cost_log_path: Some(paths.cost_log_path.clone()),
    };
    let invocation = agent.invoke(&request)?;

    match parse_signal("DRIFT_DETECTED", &invocation.raw_output).as_deref() {
        Some("false") => {
            debug!("no drift");
            Ok(true)
        }
        Some(value) => {
            warn!(value, "drift reported");
            Ok(false)
        }
        None => {
            warn!("agent emitted no DRIFT_DETECTED signal");
            Ok(false)
        }
    }
}

/// Validate all features with sources; returns failing feature names.
pub fn run_drift_validation<A: Agent>(
    agent: &A,
    paths: &ProjectPaths,
    config: &BuildConfig,
    features: &[Feature],
) -> Vec<String> {
    let pairs = drift_pairs(features, paths);
    if pairs.is_empty() {
        return Vec::new();
    }
    let workers = default_workers(pairs.len());
    info!(pairs = pairs.len(), workers, "running drift validation");
    run_parallel(&pairs, workers, |pair| {
        check_drift_with_agent(agent, paths, config, pair)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedAgent, feature, spec_markdown};
    use std::collections::HashSet;
    use std::path::Path;

    fn pair(name: &str) -> DriftPair {
        DriftPair {
            feature_name: name.to_string(),
            spec_path: PathBuf::from(format!("{name}.md")),
            source_reference: format!("src/{name}"),
        }
    }

    #[test]
    fn run_parallel_reports_failures_in_input_order() {
        let pairs = vec![pair("a"), pair("b"), pair("c"), pair("d")];
        let failing = run_parallel(&pairs, 3, |pair| {
            Ok(pair.feature_name == "a" || pair.feature_name == "c")
        });
        assert_eq!(failing, vec!["b".to_string(), "d".to_string()]);
    }

    #[test]
    fn run_parallel_visits_every_pair_exactly_once() {
        let pairs: Vec<DriftPair> = (0..17).map(|i| pair(&format!("f{i}"))).collect();
        let seen = Mutex::new(HashSet::new());
        let failing = run_parallel(&pairs, 4, |pair| {
            assert!(seen.lock().expect("lock").insert(pair.feature_name.clone()));
            Ok(true)
        });
        assert!(failing.is_empty());
        assert_eq!(seen.into_inner().expect("set").len(), 17);
    }

    #[test]
    fn erroring_check_counts_as_failing() {
        let pairs = vec![pair("a"), pair("b")];
        let failing = run_parallel(&pairs, 1, |pair| {
            if pair.feature_name == "a" {
                anyhow::bail!("boom");
            }
            Ok(true)
        });
        assert_eq!(failing, vec!["a".to_string()]);
    }

    #[test]
    fn features_without_sources_are_not_checked() {
        let mut a = feature(1, "a", &[]);
        a.source = "-".to_string();
        let b = feature(2, "b", &[]);
        let paths = ProjectPaths::new(Path::new("/tmp/proj"));

        let pairs = drift_pairs(&[a, b], &paths);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].feature_name, "b");
    }

    #[test]
    fn agent_check_passes_only_on_explicit_false() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        let config = BuildConfig::default();
        std::fs::create_dir_all(&paths.specs_dir).expect("specs dir");
        std::fs::write(paths.spec_path("login"), spec_markdown("login")).expect("spec");

        let pair = DriftPair {
            feature_name: "login".to_string(),
            spec_path: paths.spec_path("login"),
            source_reference: "src/login".to_string(),
        };

        let agent = ScriptedAgent::new(vec![
            ScriptedAgent::success("reviewed\nDRIFT_DETECTED: false"),
            ScriptedAgent::success("reviewed\nDRIFT_DETECTED: true"),
            ScriptedAgent::success("no signal at all"),
        ]);
        assert!(check_drift_with_agent(&agent, &paths, &config, &pair).expect("check"));
        assert!(!check_drift_with_agent(&agent, &paths, &config, &pair).expect("check"));
        assert!(!check_drift_with_agent(&agent, &paths, &config, &pair).expect("check"));
    }
}
