// src/dag/run_step.rs

//! Step-by-step result type for workflow run transitions.

use std::time::Duration;

use crate::dag::task_run::ScheduledTask;
use crate::types::{TaskName, WorkflowRunState};

/// A retry the caller must schedule: re-invoke `task` at `attempt` once
/// `delay` has elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRequest {
    pub task: TaskName,
    pub attempt: u32,
    pub delay: Duration,
    /// Message of the failure that caused the retry.
    pub error: Option<String>,
}

/// Structured result of a single workflow run "step".
///
/// Useful for tests that want to step a run by hand and make assertions
/// about what changed.
#[derive(Debug, Clone, Default)]
pub struct RunStep {
    /// Tasks that became ready and were marked `Running` in this step.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Retries to schedule.
    pub retries: Vec<RetryRequest>,
    /// Tasks that failed terminally on their own in this step.
    pub newly_failed: Vec<TaskName>,
    /// Downstream tasks failed without running because of `newly_failed`.
    pub skipped: Vec<TaskName>,
    /// Terminal state reached in this step, if any.
    pub run_finished: Option<WorkflowRunState>,
    /// The input did not apply (stale attempt, unknown task, finished run).
    pub ignored: bool,
}

impl RunStep {
    pub fn ignored() -> Self {
        Self {
            ignored: true,
            ..Self::default()
        }
    }
}
