// src/exec/child_process.rs

//! Subprocess executor: runs the task script once per invocation.
//!
//! Resource handling on every exit path:
//! - the script lives in a [`TempPath`], removed when the invocation ends
//! - the child is spawned with `kill_on_drop`, in its own process group
//! - both pipe readers are joined (bounded) before completion is reported

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempPath;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::TaskKey;

use super::executor::{ExecFuture, ExecOutcome, Executor};

/// How long to wait for pipe readers after the child has exited. A
/// grandchild that inherited the pipes may keep them open indefinitely.
const PIPE_DRAIN: Duration = Duration::from_secs(2);

pub struct ChildProcessExecutor {
    task: TaskKey,
    script: String,
    script_dir: PathBuf,
    kill_grace: Duration,
}

impl ChildProcessExecutor {
    pub fn new(task: TaskKey, script: String, script_dir: PathBuf, kill_grace: Duration) -> Self {
        Self {
            task,
            script,
            script_dir,
            kill_grace,
        }
    }

    fn write_script(&self) -> std::io::Result<TempPath> {
        use std::io::Write;

        let mut file = tempfile::Builder::new()
            .prefix(&format!("fleet-agent-{}-{}-", self.task.id, self.task.shell_id))
            .suffix(".sh")
            .tempfile_in(&self.script_dir)?;
        file.write_all(self.script.as_bytes())?;
        file.flush()?;
        Ok(file.into_temp_path())
    }

    async fn run_once(&self, cancel: &CancellationToken) -> ExecOutcome {
        let task_id = self.task.id;

        let script = match self.write_script() {
            Ok(path) => path,
            Err(e) => {
                return ExecOutcome::Failed(format!(
                    "writing script in {}: {e}",
                    self.script_dir.display()
                ));
            }
        };

        let mut cmd = Command::new("sh");
        cmd.arg(&*script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                close_script(script);
                return ExecOutcome::Failed(format!("spawning sh: {e}"));
            }
        };

        let pid = child.id();
        info!(task_id, ?pid, script = %script.display(), "task script started");

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            drop(child);
            close_script(script);
            return ExecOutcome::Failed("child pipes unavailable".to_string());
        };
        let pumps = [
            tokio::spawn(pump(stdout, "stdout", task_id)),
            tokio::spawn(pump(stderr, "stderr", task_id)),
        ];

        let outcome = supervise(&mut child, cancel, self.kill_grace, task_id).await;

        drain(pumps).await;
        drop(child);
        close_script(script);
        outcome
    }
}

impl Executor for ChildProcessExecutor {
    fn name(&self) -> &'static str {
        "child_process"
    }

    fn execute<'a>(&'a mut self, cancel: &'a CancellationToken) -> ExecFuture<'a> {
        Box::pin(self.run_once(cancel))
    }
}

/// Wait for the child to exit, or terminate it once `cancel` fires.
async fn supervise(
    child: &mut Child,
    cancel: &CancellationToken,
    grace: Duration,
    task_id: i64,
) -> ExecOutcome {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => {
                // A failing script is still a completed run.
                if status.success() {
                    info!(task_id, "task script exited");
                } else {
                    warn!(task_id, code = ?status.code(), "task script exited with failure");
                }
                ExecOutcome::Completed
            }
            Err(e) => ExecOutcome::Failed(format!("waiting for child: {e}")),
        },
        _ = cancel.cancelled() => {
            terminate(child, grace, task_id).await;
            ExecOutcome::Cancelled
        }
    }
}

/// SIGTERM the process group, then SIGKILL after `grace`.
async fn terminate(child: &mut Child, grace: Duration, task_id: i64) {
    let Some(pid) = child.id() else {
        debug!(task_id, "child already reaped");
        return;
    };

    info!(task_id, pid, "stopping task script");
    signal_group(pid, Signal::Term, task_id);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!(task_id, pid, ?status, "task script terminated"),
        Ok(Err(e)) => warn!(task_id, pid, error = %e, "waiting for terminated child failed"),
        Err(_) => {
            warn!(task_id, pid, grace_ms = grace.as_millis() as u64, "task script ignored SIGTERM; killing");
            signal_group(pid, Signal::Kill, task_id);
            if let Err(e) = child.kill().await {
                debug!(task_id, pid, error = %e, "kill after SIGKILL");
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: Signal, task_id: i64) {
    let sig = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        warn!(task_id, pid, "pid out of range; not signalled");
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(-pgid, sig) };
    if rc == 0 {
        return;
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        debug!(task_id, pid, ?signal, "process group already gone");
    } else {
        warn!(task_id, pid, ?signal, error = %err, "signal delivery failed");
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: Signal, _task_id: i64) {}

/// Log every line of `reader`. Non-UTF-8 output is decoded lossily.
async fn pump<R>(reader: R, stream: &'static str, task_id: i64)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                info!(
                    target: "fleet_agent::child",
                    task_id,
                    stream,
                    "{}",
                    line.trim_end_matches(['\r', '\n'])
                );
            }
            Err(e) => {
                warn!(task_id, stream, error = %e, "pipe read failed");
                break;
            }
        }
    }
}

async fn drain(pumps: [JoinHandle<()>; 2]) {
    for pump in pumps {
        let abort = pump.abort_handle();
        if tokio::time::timeout(PIPE_DRAIN, pump).await.is_err() {
            debug!("pipe still open after child exit; reader aborted");
            abort.abort();
        }
    }
}

fn close_script(script: TempPath) {
    let path = script.to_path_buf();
    if let Err(e) = script.close() {
        warn!(path = %path.display(), error = %e, "cannot remove task script");
    }
}
