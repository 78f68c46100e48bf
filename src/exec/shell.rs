// src/exec/shell.rs

//! Shell command executor.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tracing::{debug, info};

use crate::engine::TaskOutcome;
use crate::exec::{ExecutionRequest, TaskExecutor};

/// Runs each command with `sh -c` (`cmd /C` on Windows).
///
/// The process inherits the environment of crondag plus the task's `env`
/// and these variables:
/// - `CRONDAG_WORKFLOW_ID`
/// - `CRONDAG_TASK_ID`
/// - `CRONDAG_SCHEDULED_FOR` (RFC 3339)
/// - `CRONDAG_ATTEMPT`
///
/// A non-zero exit fails the invocation; the last non-empty stderr line
/// becomes the failure message. The child is killed if the invocation is
/// dropped (cancellation, timeout).
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }

    fn command(request: &ExecutionRequest) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&request.command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&request.command);
            c
        };

        cmd.envs(&request.env)
            .env("CRONDAG_WORKFLOW_ID", &request.run.workflow_id)
            .env("CRONDAG_TASK_ID", &request.task)
            .env("CRONDAG_SCHEDULED_FOR", request.run.scheduled_for.to_rfc3339())
            .env("CRONDAG_ATTEMPT", request.attempt.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, request: &ExecutionRequest) -> TaskOutcome {
        info!(
            run = %request.run,
            task = %request.task,
            attempt = request.attempt,
            cmd = %request.command,
            "starting task process"
        );

        let mut child = match Self::command(request).spawn() {
            Ok(child) => child,
            Err(e) => {
                return TaskOutcome::failed(format!("failed to spawn '{}': {e}", request.command));
            }
        };

        // Always consume stdout so the pipe never fills; log at debug.
        if let Some(stdout) = child.stdout.take() {
            let task = request.task.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(task = %task, "stdout: {}", line);
                }
            });
        }

        let stderr = child.stderr.take();
        let (status, last_stderr) =
            tokio::join!(child.wait(), read_stderr(stderr, request.task.as_str()));

        match status {
            Ok(status) if status.success() => {
                info!(run = %request.run, task = %request.task, "task process exited successfully");
                TaskOutcome::success()
            }
            Ok(status) => {
                let code = status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                info!(run = %request.run, task = %request.task, exit_code = %code, "task process failed");
                let message = match last_stderr {
                    Some(line) => format!("exit code {code}: {line}"),
                    None => format!("exit code {code}"),
                };
                TaskOutcome::failed(message)
            }
            Err(e) => TaskOutcome::failed(format!("waiting for process failed: {e}")),
        }
    }
}

impl TaskExecutor for ShellExecutor {
    fn execute<'a>(
        &'a self,
        request: &'a ExecutionRequest,
    ) -> Pin<Box<dyn Future<Output = TaskOutcome> + Send + 'a>> {
        Box::pin(self.run(request))
    }
}

/// Log every stderr line and keep the last non-empty one.
async fn read_stderr(stderr: Option<ChildStderr>, task: &str) -> Option<String> {
    let stderr = stderr?;
    let mut lines = BufReader::new(stderr).lines();
    let mut last = None;

    while let Ok(Some(line)) = lines.next_line().await {
        debug!(task = %task, "stderr: {}", line);
        if !line.trim().is_empty() {
            last = Some(line);
        }
    }

    last
}
