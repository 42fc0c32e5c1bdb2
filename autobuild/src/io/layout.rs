//! On-disk layout of orchestrator files within a project.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Well-known paths under a project root.
///
/// Everything the engine owns lives in `.autobuild/`; the roadmap and feature
/// specs are external inputs under `.specs/`.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub lock_path: PathBuf,
    pub state_path: PathBuf,
    pub config_path: PathBuf,
    pub roadmap_path: PathBuf,
    pub specs_dir: PathBuf,
    pub feature_logs_dir: PathBuf,
    pub cost_log_path: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: &Path) -> Self {
        let state_dir = root.join(".autobuild");
        Self {
            root: root.to_path_buf(),
            lock_path: state_dir.join("lock.pid"),
            state_path: state_dir.join("state").join("resume.json"),
            config_path: state_dir.join("config.toml"),
            roadmap_path: root.join(".specs").join("roadmap.md"),
            specs_dir: root.join(".specs").join("features"),
            feature_logs_dir: state_dir.join("logs").join("features"),
            cost_log_path: state_dir.join("logs").join("cost.jsonl"),
        }
    }

    /// Create the engine-owned directories and keep them out of version
    /// control: the state dir carries a self-ignoring `.gitignore`.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.state_path.parent().expect("state path has parent"),
            self.feature_logs_dir.as_path(),
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("create directory {}", dir.display()))?;
        }
        let gitignore = self.root.join(".autobuild").join(".gitignore");
        if !gitignore.exists() {
            fs::write(&gitignore, "*\n")
                .with_context(|| format!("write {}", gitignore.display()))?;
        }
        Ok(())
    }

    /// Spec file for a feature, derived from its name.
    pub fn spec_path(&self, feature_name: &str) -> PathBuf {
        self.specs_dir.join(format!("{}.md", slugify(feature_name)))
    }

    pub fn feature_log_path(&self, feature_name: &str) -> PathBuf {
        self.feature_logs_dir
            .join(format!("{}.log", slugify(feature_name)))
    }
}

/// Lowercase, alphanumerics kept, runs of anything else collapsed to `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_and_trims() {
        assert_eq!(slugify("User Login (v2)"), "user-login-v2");
        assert_eq!(slugify("billing"), "billing");
        assert_eq!(slugify("a  b"), "a-b");
    }

    #[test]
    fn paths_are_rooted_under_the_project() {
        let paths = ProjectPaths::new(Path::new("/tmp/proj"));
        assert!(paths.lock_path.ends_with(".autobuild/lock.pid"));
        assert!(paths.state_path.ends_with(".autobuild/state/resume.json"));
        assert!(paths.roadmap_path.ends_with(".specs/roadmap.md"));
        assert!(paths.spec_path("User Login").ends_with(".specs/features/user-login.md"));
    }

    #[test]
    fn ensure_dirs_writes_self_ignoring_gitignore() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        paths.ensure_dirs().expect("ensure dirs");
        let gitignore =
            fs::read_to_string(temp.path().join(".autobuild/.gitignore")).expect("read");
        assert_eq!(gitignore, "*\n");
    }
}
