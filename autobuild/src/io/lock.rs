//! Exclusive single-instance-per-project execution guard.
//!
//! The lock is a pid-bearing file created with `create_new` (O_EXCL). A lock
//! whose recorded owner is no longer alive is stale and may be reclaimed by a
//! new run; that reclamation is an expected recovery path, not an error.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::errors::OrchestratorError;

const ACQUIRE_ATTEMPTS: u32 = 3;

/// Handle for a held build lock. Released explicitly or on drop.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
    released: bool,
}

impl BuildLock {
    /// Acquire the lock at `path`.
    ///
    /// Fails with [`OrchestratorError::LockContention`] if the recorded owner
    /// is alive. A corrupt lock file or a dead owner is removed and the
    /// acquisition retried, bounded so two racing reclaims cannot spin.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create lock directory {}", parent.display()))?;
        }

        for _ in 0..ACQUIRE_ATTEMPTS {
            match fs::OpenOptions::new().create_new(true).write(true).open(path) {
                Ok(mut file) => {
                    writeln!(file, "{}", process::id())
                        .with_context(|| format!("write pid to {}", path.display()))?;
                    file.sync_all()
                        .with_context(|| format!("sync lock file {}", path.display()))?;
                    debug!(pid = process::id(), "lock acquired");
                    return Ok(Self {
                        path: path.to_path_buf(),
                        released: false,
                    });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    match read_owner_pid(path) {
                        Some(pid) if process_alive(pid) => {
                            return Err(OrchestratorError::LockContention {
                                pid,
                                path: path.to_path_buf(),
                            }
                            .into());
                        }
                        Some(pid) => {
                            warn!(stale_pid = pid, "removing stale lock (owner no longer running)");
                        }
                        None => {
                            warn!("removing corrupt lock file");
                        }
                    }
                    remove_ignoring_missing(path)?;
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("create lock file {}", path.display()));
                }
            }
        }

        Err(anyhow!(
            "could not acquire lock {} after {ACQUIRE_ATTEMPTS} attempts",
            path.display()
        ))
    }

    /// Release the lock. Safe to call even if the file was already removed.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        remove_ignoring_missing(&self.path)
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Pid recorded in the lock file, if the file exists and parses.
pub fn read_owner_pid(path: &Path) -> Option<u32> {
    let contents = fs::read_to_string(path).ok()?;
    contents.trim().parse().ok()
}

fn remove_ignoring_missing(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove lock file {}", path.display())),
    }
}

/// True if a process with `pid` exists.
///
/// Uses `kill(pid, 0)`. EPERM means the process exists but belongs to another
/// user, which must still count as alive: a false "dead" would let two
/// orchestrators run against the same repository.
#[cfg(unix)]
#[allow(unsafe_code)]
fn process_alive(pid: u32) -> bool {
    let ret = unsafe { libc::kill(pid as i32, 0) };
    if ret == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    // No portable liveness probe; err on the side of contention.
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_own_pid() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("lock.pid");
        let lock = BuildLock::acquire(&path).expect("acquire");
        assert_eq!(read_owner_pid(&path), Some(process::id()));
        lock.release().expect("release");
        assert!(!path.exists());
    }

    #[test]
    fn second_acquire_fails_while_owner_is_alive() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("lock.pid");
        let _lock = BuildLock::acquire(&path).expect("acquire");

        let err = BuildLock::acquire(&path).unwrap_err();
        match err.downcast_ref::<OrchestratorError>() {
            Some(OrchestratorError::LockContention { pid, .. }) => {
                assert_eq!(*pid, process::id());
            }
            other => panic!("expected LockContention, got {other:?}"),
        }
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("lock.pid");
        // A pid far beyond any real pid space on test hosts.
        fs::write(&path, "999999999\n").expect("seed stale lock");

        let lock = BuildLock::acquire(&path).expect("reclaim stale lock");
        assert_eq!(read_owner_pid(&path), Some(process::id()));
        lock.release().expect("release");
    }

    #[test]
    fn corrupt_lock_is_reclaimed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("lock.pid");
        fs::write(&path, "not a pid\n").expect("seed corrupt lock");

        let lock = BuildLock::acquire(&path).expect("reclaim corrupt lock");
        lock.release().expect("release");
    }

    #[test]
    fn release_is_idempotent_against_external_removal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("lock.pid");
        let lock = BuildLock::acquire(&path).expect("acquire");
        fs::remove_file(&path).expect("external removal");
        lock.release().expect("release after external removal");
    }

    #[test]
    fn drop_removes_the_lock_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("lock.pid");
        {
            let _lock = BuildLock::acquire(&path).expect("acquire");
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
