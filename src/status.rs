// src/status.rs

//! Read-only status queries over the run store.

use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::dag::WorkflowRun;
use crate::store::RunStore;
use crate::types::{RunKey, TaskName, TaskRunState, WorkflowRunState};

/// Snapshot of one run and the state of each of its tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatus {
    pub key: RunKey,
    pub state: WorkflowRunState,
    pub tasks: Vec<TaskStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    pub task: TaskName,
    pub state: TaskRunState,
    pub attempt: u32,
    pub skipped: bool,
    pub last_error: Option<String>,
}

impl From<&WorkflowRun> for RunStatus {
    fn from(run: &WorkflowRun) -> Self {
        Self {
            key: run.key.clone(),
            state: run.state,
            tasks: run
                .tasks
                .values()
                .map(|tr| TaskStatus {
                    task: tr.task.clone(),
                    state: tr.state,
                    attempt: tr.attempt,
                    skipped: tr.skipped,
                    last_error: tr.last_error.clone(),
                })
                .collect(),
            started_at: run.started_at,
            finished_at: run.finished_at,
        }
    }
}

/// Status of the run of `workflow_id` scheduled for `scheduled_for`, if it
/// exists.
pub fn get_run_status(
    store: &dyn RunStore,
    workflow_id: &str,
    scheduled_for: DateTime<Utc>,
) -> anyhow::Result<Option<RunStatus>> {
    let key = RunKey::new(workflow_id, scheduled_for);
    Ok(store.get(&key)?.as_ref().map(RunStatus::from))
}

/// Status of every stored run of `workflow_id`, oldest first.
pub fn list_run_statuses(store: &dyn RunStore, workflow_id: &str) -> anyhow::Result<Vec<RunStatus>> {
    Ok(store
        .list(Some(workflow_id))?
        .iter()
        .map(RunStatus::from)
        .collect())
}

/// Human-readable report used by `--status`.
pub fn format_statuses(workflow_id: &str, statuses: &[RunStatus]) -> String {
    let mut out = String::new();

    if statuses.is_empty() {
        let _ = writeln!(out, "no runs recorded for workflow '{workflow_id}'");
        return out;
    }

    let _ = writeln!(out, "workflow '{workflow_id}' ({} runs):", statuses.len());
    for status in statuses {
        let _ = writeln!(
            out,
            "  {}  {:?}{}",
            status
                .key
                .scheduled_for
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            status.state,
            status
                .finished_at
                .map(|t| format!(" (finished {})", t.to_rfc3339_opts(SecondsFormat::Secs, true)))
                .unwrap_or_default()
        );
        for task in status.tasks.iter() {
            let _ = write!(out, "    - {}: {:?}", task.task, task.state);
            if task.attempt > 0 {
                let _ = write!(out, " (attempt {})", task.attempt);
            }
            if task.skipped {
                let _ = write!(out, " [skipped]");
            }
            if let Some(err) = task.last_error.as_deref() {
                let _ = write!(out, ": {err}");
            }
            out.push('\n');
        }
    }

    out
}
