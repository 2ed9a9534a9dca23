#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Subprocess execution with captured output and a hard deadline.

use std::{
    ffi::{OsStr, OsString},
    path::Path,
    process::Stdio,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncRead, AsyncReadExt, BufReader},
    process::{Child, Command},
    task::JoinHandle,
    time::timeout,
};

/// Drop guard that terminates a spawned child process if the owning future is
/// dropped before the child has been reaped.
struct ChildDropGuard(Option<Child>);

impl ChildDropGuard {
    /// Wraps the provided child process with the drop guard.
    fn new(child: Child) -> Self {
        Self(Some(child))
    }

    /// Returns a mutable reference to the underlying child process.
    fn child_mut(&mut self) -> Result<&mut Child> {
        self.0
            .as_mut()
            .context("child process already taken from guard")
    }

    /// Prevents the guard from killing the process on drop.
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for ChildDropGuard {
    fn drop(&mut self) {
        if let Some(child) = self.0.as_mut() {
            let _ = child.start_kill();
        }
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub struct Collected {
    /// Exit status returned by the process.
    pub status:  std::process::ExitStatus,
    /// Contents written to stdout.
    pub stdout:  Vec<u8>,
    /// Contents written to stderr.
    pub stderr:  Vec<u8>,
    /// Wall-clock time from spawn to exit.
    pub elapsed: Duration,
}

impl Collected {
    /// Lossy UTF-8 view of stderr.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Lossy UTF-8 view of stdout.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }
}

/// How a deadline-bounded subprocess ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The process exited on its own.
    Finished(Collected),
    /// The deadline expired; the process was killed and reaped.
    TimedOut {
        /// Wall-clock time from spawn until the kill completed.
        elapsed: Duration,
    },
}

/// Spawns a reader task that drains a pipe to completion.
fn drain<R>(pipe: R, label: &'static str) -> JoinHandle<Result<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .with_context(|| format!("failed to read {label}"))?;
        Ok(buf)
    })
}

/// Spawns `program` with stdin closed, collects stdout/stderr, and enforces
/// `deadline` by force-killing the child when it expires.
///
/// Returns `Err` only when the process could not be spawned or waited on; a
/// non-zero exit is reported through [`Collected::status`].
pub async fn run_collect(
    program: impl AsRef<OsStr>,
    args: &[OsString],
    cwd: Option<&Path>,
    env: &[(OsString, OsString)],
    deadline: Option<Duration>,
) -> Result<RunOutcome> {
    let mut cmd = Command::new(program.as_ref());
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in env {
        cmd.env(key, value);
    }

    let started = Instant::now();
    let mut guard = ChildDropGuard::new(cmd.spawn().with_context(|| {
        format!("failed to spawn {}", program.as_ref().to_string_lossy())
    })?);

    let stdout = guard
        .child_mut()?
        .stdout
        .take()
        .context("missing stdout pipe")?;
    let stderr = guard
        .child_mut()?
        .stderr
        .take()
        .context("missing stderr pipe")?;

    let mut out_task = drain(stdout, "stdout");
    let mut err_task = drain(stderr, "stderr");

    // The deadline covers the drains too: a descendant can keep the pipes
    // open after the child itself has exited.
    let collect = async {
        let status = guard
            .child_mut()?
            .wait()
            .await
            .context("failed to wait on process")?;
        let stdout = (&mut out_task).await.context("stdout task join error")??;
        let stderr = (&mut err_task).await.context("stderr task join error")??;
        Ok::<_, anyhow::Error>((status, stdout, stderr))
    };

    let finished = match deadline {
        Some(limit) => timeout(limit, collect).await.ok(),
        None => Some(collect.await),
    };

    let Some(collected) = finished else {
        out_task.abort();
        err_task.abort();
        let child = guard.child_mut()?;
        if child.id().is_some()
            && let Err(e) = child.kill().await
        {
            tracing::warn!("Could not kill timed out process: {e}");
        }
        guard.disarm();
        return Ok(RunOutcome::TimedOut {
            elapsed: started.elapsed(),
        });
    };

    let (status, stdout, stderr) = collected?;
    guard.disarm();

    Ok(RunOutcome::Finished(Collected {
        status,
        stdout,
        stderr,
        elapsed: started.elapsed(),
    }))
}
