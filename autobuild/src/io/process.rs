//! Child process execution with a hard wall-clock timeout and bounded output.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes discarded beyond the in-memory limit (stdout + stderr).
    pub truncated_bytes: usize,
    pub timed_out: bool,
}

/// Run a command, kill it at `timeout`, and capture stdout/stderr.
///
/// Output is drained on reader threads while the child runs so a chatty
/// process cannot deadlock on a full pipe. At most `output_limit_bytes` per
/// stream are retained; the rest is drained and counted.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = cmd.spawn().context("spawn command")?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_dropped) = join_reader(stdout_handle).context("join stdout reader")?;
    let (stderr, stderr_dropped) = join_reader(stderr_handle).context("join stderr reader")?;
    let truncated_bytes = stdout_dropped + stderr_dropped;
    if truncated_bytes > 0 {
        warn!(truncated_bytes, "command output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        truncated_bytes,
        timed_out,
    })
}

fn join_reader(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        let keep = n.min(remaining);
        buf.extend_from_slice(&chunk[..keep]);
        dropped += n - keep;
    }

    Ok((buf, dropped))
}
