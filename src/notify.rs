// src/notify.rs

//! Failure and retry notifications.
//!
//! The engine decides *when* to notify (per the task's `alert_on_retry` /
//! `alert_on_failure` flags); a [`Notifier`] decides *how*. Delivery is
//! fire-and-forget: a notifier must not block and its failures never reach
//! the engine.

use std::fmt;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, error, warn};

use crate::types::{RunKey, TaskName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// A failed attempt will be retried.
    RetryOccurred,
    /// A task failed with its retry budget exhausted.
    TaskFailedTerminal,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::RetryOccurred => f.write_str("retry_occurred"),
            NotificationKind::TaskFailedTerminal => f.write_str("task_failed_terminal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub run: RunKey,
    pub task: TaskName,
    pub owner: String,
    /// Attempt that failed.
    pub attempt: u32,
    pub error: Option<String>,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Default notifier: writes notifications to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: &Notification) {
        match n.kind {
            NotificationKind::RetryOccurred => warn!(
                run = %n.run,
                task = %n.task,
                owner = %n.owner,
                attempt = n.attempt,
                error = n.error.as_deref().unwrap_or(""),
                "notification: task retry"
            ),
            NotificationKind::TaskFailedTerminal => error!(
                run = %n.run,
                task = %n.task,
                owner = %n.owner,
                attempt = n.attempt,
                error = n.error.as_deref().unwrap_or(""),
                "notification: task failed"
            ),
        }
    }
}

/// Runs a shell command per notification with the details in environment
/// variables (`CRONDAG_EVENT`, `CRONDAG_WORKFLOW_ID`, `CRONDAG_SCHEDULED_FOR`,
/// `CRONDAG_TASK_ID`, `CRONDAG_OWNER`, `CRONDAG_ATTEMPT`, `CRONDAG_ERROR`).
///
/// Must be used from within a Tokio runtime.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    command: String,
}

impl CommandNotifier {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, n: &Notification) {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .env("CRONDAG_EVENT", n.kind.to_string())
            .env("CRONDAG_WORKFLOW_ID", &n.run.workflow_id)
            .env("CRONDAG_SCHEDULED_FOR", n.run.scheduled_for.to_rfc3339())
            .env("CRONDAG_TASK_ID", &n.task)
            .env("CRONDAG_OWNER", &n.owner)
            .env("CRONDAG_ATTEMPT", n.attempt.to_string())
            .env("CRONDAG_ERROR", n.error.as_deref().unwrap_or(""))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let run = n.run.clone();
        let task = n.task.clone();
        tokio::spawn(async move {
            match cmd.status().await {
                Ok(status) if status.success() => {
                    debug!(run = %run, task = %task, "notification command succeeded")
                }
                Ok(status) => warn!(
                    run = %run,
                    task = %task,
                    exit_code = status.code().unwrap_or(-1),
                    "notification command failed"
                ),
                Err(e) => warn!(run = %run, task = %task, error = %e, "failed to spawn notification command"),
            }
        });
    }
}
