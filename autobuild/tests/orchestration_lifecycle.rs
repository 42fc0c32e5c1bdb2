//! Loop-level tests for full build lifecycles.
//!
//! These drive `run_build` end to end with scripted agents: multi-pass
//! strategies, resume after a halt, and drift validation.

use std::fs;

use autobuild::build::{BranchStrategy, BuildOptions, BuildOutcome, run_build};
use autobuild::io::layout::ProjectPaths;
use autobuild::io::state::read_state;
use autobuild::test_support::{ScriptedAgent, init_git_repo, roadmap_table, spec_markdown};
use tempfile::TempDir;

const DONE: &str = "done\nIMPLEMENTATION_COMPLETE: true\n";
const NO_DRIFT: &str = "reviewed\nDRIFT_DETECTED: false\n";

fn project(rows: &[(u32, &str, &[u32], &str)]) -> TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    init_git_repo(temp.path()).expect("init repo");
    let paths = ProjectPaths::new(temp.path());
    fs::create_dir_all(&paths.specs_dir).expect("specs dir");
    fs::create_dir_all(paths.roadmap_path.parent().expect("parent")).expect("roadmap dir");
    fs::write(&paths.roadmap_path, roadmap_table(rows)).expect("roadmap");
    for (_, name, _, _) in rows {
        fs::write(paths.spec_path(name), spec_markdown(name)).expect("spec");
    }
    temp
}

/// `both` runs a chained pass, then an independent pass, then drift checks.
///
/// Two features: 2 chained builds + 2 independent builds + 2 drift reviews.
#[test]
fn both_strategy_runs_two_passes_then_drift() {
    let temp = project(&[(1, "alpha", &[], "⬜"), (2, "beta", &[1], "⬜")]);
    let agent = ScriptedAgent::new(vec![
        ScriptedAgent::success(DONE),
        ScriptedAgent::success(DONE),
        ScriptedAgent::success(DONE),
        ScriptedAgent::success(DONE),
        ScriptedAgent::success(NO_DRIFT),
        ScriptedAgent::success(NO_DRIFT),
    ]);
    let options = BuildOptions {
        strategy: BranchStrategy::Both,
        max_features: None,
        drift_check: Some(true),
    };

    let outcome = run_build(&agent, temp.path(), &options).expect("build");
    assert_eq!(outcome, BuildOutcome::Completed { features_built: 4 });
    assert_eq!(agent.calls(), 6);

    let paths = ProjectPaths::new(temp.path());
    assert!(!paths.state_path.exists());
    assert!(!paths.lock_path.exists());
}

/// A halt in the chained pass of `both` resumes in that pass, finishes it,
/// and still runs the independent pass afterwards.
#[test]
fn both_strategy_resumes_into_the_interrupted_pass() {
    let temp = project(&[(1, "alpha", &[], "⬜"), (2, "beta", &[1], "⬜")]);
    let paths = ProjectPaths::new(temp.path());
    let options = BuildOptions {
        strategy: BranchStrategy::Both,
        max_features: None,
        drift_check: Some(false),
    };

    let first = ScriptedAgent::new(vec![
        ScriptedAgent::success(DONE),
        ScriptedAgent::failure(2, "compile error"),
    ]);
    let outcome = run_build(&first, temp.path(), &options).expect("build");
    assert_eq!(
        outcome,
        BuildOutcome::HaltedForRetry {
            feature: "beta".to_string(),
            reason: "agent exited with code 2".to_string()
        }
    );
    let state = read_state(&paths.state_path).expect("read").expect("state");
    assert_eq!(state.branch_strategy, "chained");
    assert_eq!(state.completed_features, vec!["alpha"]);

    // beta (chained), then alpha and beta again on independent branches.
    let second = ScriptedAgent::new(vec![
        ScriptedAgent::success(DONE),
        ScriptedAgent::success(DONE),
        ScriptedAgent::success(DONE),
    ]);
    let outcome = run_build(&second, temp.path(), &options).expect("resume");
    assert_eq!(outcome, BuildOutcome::Completed { features_built: 3 });
    assert_eq!(second.calls(), 3);
    assert!(!paths.state_path.exists());
}

/// Transient failures are retried inside a single feature without touching
/// resume bookkeeping.
#[test]
fn transient_failures_inside_a_feature_are_invisible_to_resume() {
    let temp = project(&[(1, "alpha", &[], "⬜")]);
    let paths = ProjectPaths::new(temp.path());

    // Speed up backoff for the test.
    let config = autobuild::io::config::BuildConfig {
        backoff_base_secs: 0,
        backoff_cap_secs: 0,
        ..Default::default()
    };
    autobuild::io::config::write_config(&paths.config_path, &config).expect("config");

    let agent = ScriptedAgent::new(vec![
        ScriptedAgent::failure(1, "429 too many requests"),
        ScriptedAgent::failure(1, "model overloaded"),
        ScriptedAgent::success(DONE),
    ]);
    let options = BuildOptions {
        strategy: BranchStrategy::Chained,
        max_features: None,
        drift_check: Some(false),
    };

    let outcome = run_build(&agent, temp.path(), &options).expect("build");
    assert_eq!(outcome, BuildOutcome::Completed { features_built: 1 });
    assert_eq!(agent.calls(), 3);
    assert!(!paths.state_path.exists());
}

/// An invalid spec frontmatter fails the feature before any agent call.
#[test]
fn invalid_spec_frontmatter_fails_before_invoking_the_agent() {
    let temp = project(&[(1, "alpha", &[], "⬜")]);
    let paths = ProjectPaths::new(temp.path());
    fs::write(paths.spec_path("alpha"), "# No frontmatter here\n").expect("spec");

    let agent = ScriptedAgent::new(Vec::new());
    let options = BuildOptions {
        strategy: BranchStrategy::Chained,
        max_features: None,
        drift_check: Some(false),
    };

    let err = run_build(&agent, temp.path(), &options).unwrap_err();
    assert!(err.to_string().contains("invalid spec"));
    assert_eq!(agent.calls(), 0);
}
