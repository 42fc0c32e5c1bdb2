//! Git adapter for branch management and per-feature commits.
//!
//! Branch mechanics differ by strategy, so we keep a small, explicit wrapper
//! around `git` subprocess calls rather than a full libgit binding.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD (refuse to run)"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    /// Create and checkout a new branch at current HEAD.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_new_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "creating and checking out new branch");
        self.run_checked(&["checkout", "-b", branch])?;
        Ok(())
    }

    /// Create and checkout a new branch rooted at `base`.
    #[instrument(skip_all, fields(branch, base))]
    pub fn checkout_new_branch_from(&self, branch: &str, base: &str) -> Result<()> {
        debug!(branch, base, "creating branch from base");
        self.run_checked(&["checkout", "-b", branch, base])?;
        Ok(())
    }

    /// Checkout an existing branch.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::init_git_repo;

    #[test]
    fn branch_lifecycle_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path()).expect("init repo");
        let git = Git::new(temp.path());

        let base = git.current_branch().expect("current branch");
        assert!(!git.branch_exists("autobuild/run").expect("exists"));

        git.checkout_new_branch("autobuild/run").expect("new branch");
        assert_eq!(git.current_branch().expect("branch"), "autobuild/run");
        assert!(git.branch_exists("autobuild/run").expect("exists"));

        git.checkout_branch(&base).expect("back to base");
        assert_eq!(git.current_branch().expect("branch"), base);
    }

    #[test]
    fn commit_staged_skips_when_nothing_staged() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path()).expect("init repo");
        let git = Git::new(temp.path());

        assert!(!git.commit_staged("empty").expect("commit"));

        std::fs::write(temp.path().join("new.txt"), "contents\n").expect("write file");
        git.add_all().expect("add");
        assert!(git.commit_staged("add new.txt").expect("commit"));
        assert!(!git.commit_staged("nothing left").expect("commit"));
    }

    #[test]
    fn branch_from_base_roots_at_named_branch() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path()).expect("init repo");
        let git = Git::new(temp.path());
        let base = git.current_branch().expect("base");

        git.checkout_new_branch("autobuild/first").expect("first");
        std::fs::write(temp.path().join("a.txt"), "a\n").expect("write");
        git.add_all().expect("add");
        git.commit_staged("first feature").expect("commit");

        git.checkout_new_branch_from("autobuild/second", &base)
            .expect("second");
        assert_eq!(git.current_branch().expect("branch"), "autobuild/second");
        assert!(!temp.path().join("a.txt").exists());
    }
}
