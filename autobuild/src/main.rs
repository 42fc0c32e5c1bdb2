//! Unattended build orchestrator CLI.
//!
//! Drives a feature roadmap (`.specs/roadmap.md`) through one coding-agent
//! invocation per feature, with dependency-order scheduling, crash-durable
//! resume state, and retry on transient agent failures.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use autobuild::build::{BranchStrategy, BuildOptions, BuildOutcome, run_build};
use autobuild::core::graph::{check_acyclic, topological_order};
use autobuild::core::roadmap::parse_roadmap;
use autobuild::errors::OrchestratorError;
use autobuild::exit_codes;
use autobuild::io::agent::ClaudeAgent;
use autobuild::io::config::{load_config, write_config};
use autobuild::io::layout::ProjectPaths;
use autobuild::io::lock::read_owner_pid;
use autobuild::io::state::read_state;
use autobuild::logging;

#[derive(Parser)]
#[command(
    name = "autobuild",
    version,
    about = "Unattended build orchestration for AI coding agents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the build loop until the roadmap completes or the run halts.
    Build {
        /// Project root (defaults to the current directory).
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
        /// Branch strategy: chained, sequential, independent or both.
        #[arg(long, default_value = "chained")]
        strategy: BranchStrategy,
        /// Build at most this many features, then stop resumably.
        #[arg(long)]
        max_features: Option<u32>,
        /// Skip drift validation after an independent pass.
        #[arg(long)]
        no_drift: bool,
    },
    /// Parse the roadmap and verify the dependency graph is acyclic.
    Check {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },
    /// Print the pending features in build order.
    Order {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },
    /// Report lock ownership and resume state.
    Status {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },
    /// Create the orchestrator directories and a default config.
    Init {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_code_for(&err));
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Build {
            project_dir,
            strategy,
            max_features,
            no_drift,
        } => cmd_build(&project_dir, strategy, max_features, no_drift),
        Command::Check { project_dir } => cmd_check(&project_dir),
        Command::Order { project_dir } => cmd_order(&project_dir),
        Command::Status { project_dir } => cmd_status(&project_dir),
        Command::Init { project_dir } => cmd_init(&project_dir),
    }
}

/// Map typed failures onto the stable exit code contract.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<OrchestratorError>() {
        Some(OrchestratorError::LockContention { .. }) => exit_codes::LOCK_HELD,
        Some(OrchestratorError::CircularDependency { .. }) => exit_codes::CIRCULAR_DEPENDENCY,
        Some(OrchestratorError::RetriesExhausted { .. }) => exit_codes::HALTED_FOR_RETRY,
        _ => exit_codes::FAILURE,
    }
}

fn cmd_build(
    project_dir: &Path,
    strategy: BranchStrategy,
    max_features: Option<u32>,
    no_drift: bool,
) -> Result<i32> {
    let paths = ProjectPaths::new(project_dir);
    let config = load_config(&paths.config_path)?;
    let agent = ClaudeAgent::new(config.agent_command.clone());

    let options = BuildOptions {
        strategy,
        max_features,
        drift_check: no_drift.then_some(false),
    };

    match run_build(&agent, project_dir, &options)? {
        BuildOutcome::Completed { features_built } => {
            println!("build complete: {features_built} feature(s) built");
            Ok(exit_codes::OK)
        }
        BuildOutcome::CapReached { features_built } => {
            println!("feature cap reached after {features_built} feature(s); rerun to continue");
            Ok(exit_codes::OK)
        }
        BuildOutcome::HaltedForRetry { feature, reason } => {
            eprintln!("halted on feature '{feature}': {reason}");
            eprintln!("state persisted; rerun to resume from this feature");
            Ok(exit_codes::HALTED_FOR_RETRY)
        }
        BuildOutcome::DriftDetected { failing } => {
            eprintln!("drift detected in: {}", failing.join(", "));
            Ok(exit_codes::DRIFT_DETECTED)
        }
    }
}

fn cmd_check(project_dir: &Path) -> Result<i32> {
    let paths = ProjectPaths::new(project_dir);
    let text = fs::read_to_string(&paths.roadmap_path)
        .with_context(|| format!("read roadmap {}", paths.roadmap_path.display()))?;
    let features = parse_roadmap(&text)?;
    check_acyclic(&features)?;
    println!("roadmap ok: {} feature(s), no cycles", features.len());
    Ok(exit_codes::OK)
}

fn cmd_order(project_dir: &Path) -> Result<i32> {
    let paths = ProjectPaths::new(project_dir);
    let text = fs::read_to_string(&paths.roadmap_path)
        .with_context(|| format!("read roadmap {}", paths.roadmap_path.display()))?;
    let features = parse_roadmap(&text)?;
    check_acyclic(&features)?;
    for feature in topological_order(&features)? {
        println!("{}\t{}", feature.id, feature.name);
    }
    Ok(exit_codes::OK)
}

fn cmd_status(project_dir: &Path) -> Result<i32> {
    let paths = ProjectPaths::new(project_dir);

    match read_owner_pid(&paths.lock_path) {
        Some(pid) => println!("lock: held by pid {pid}"),
        None => println!("lock: free"),
    }

    match read_state(&paths.state_path)? {
        Some(state) => {
            println!(
                "resume: pass '{}' at feature index {}, {} feature(s) completed (written {})",
                state.branch_strategy,
                state.feature_index,
                state.completed_features.len(),
                state.timestamp
            );
            for name in &state.completed_features {
                println!("  done: {name}");
            }
        }
        None => println!("resume: no interrupted run"),
    }
    Ok(exit_codes::OK)
}

fn cmd_init(project_dir: &Path) -> Result<i32> {
    let paths = ProjectPaths::new(project_dir);
    paths.ensure_dirs()?;
    fs::create_dir_all(&paths.specs_dir)
        .with_context(|| format!("create directory {}", paths.specs_dir.display()))?;
    if !paths.config_path.exists() {
        write_config(&paths.config_path, &Default::default())?;
        println!("wrote {}", paths.config_path.display());
    }
    println!("initialized {}", project_dir.display());
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_build_defaults() {
        let cli = Cli::parse_from(["autobuild", "build"]);
        match cli.command {
            Command::Build {
                strategy,
                max_features,
                no_drift,
                ..
            } => {
                assert_eq!(strategy, BranchStrategy::Chained);
                assert_eq!(max_features, None);
                assert!(!no_drift);
            }
            _ => panic!("expected build command"),
        }
    }

    #[test]
    fn parse_build_with_flags() {
        let cli = Cli::parse_from([
            "autobuild",
            "build",
            "--strategy",
            "both",
            "--max-features",
            "3",
            "--no-drift",
        ]);
        match cli.command {
            Command::Build {
                strategy,
                max_features,
                no_drift,
                ..
            } => {
                assert_eq!(strategy, BranchStrategy::Both);
                assert_eq!(max_features, Some(3));
                assert!(no_drift);
            }
            _ => panic!("expected build command"),
        }
    }

    #[test]
    fn rejects_unknown_strategy() {
        assert!(Cli::try_parse_from(["autobuild", "build", "--strategy", "bogus"]).is_err());
    }
}
