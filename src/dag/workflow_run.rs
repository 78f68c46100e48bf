// src/dag/workflow_run.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dag::definition::{RetryDecision, WorkflowDefinition};
use crate::dag::run_step::{RetryRequest, RunStep};
use crate::dag::task_run::{ScheduledTask, TaskRun};
use crate::engine::TaskOutcome;
use crate::types::{RunKey, TaskName, TaskRunState, WorkflowRunState};

/// One instantiation of a workflow for a logical instant.
///
/// This is plain data plus the state machine that moves it forward. It does
/// not own its [`WorkflowDefinition`]; every transition that needs the graph
/// or the policies takes it as an argument, which keeps the run serializable
/// for the run store.
///
/// Responsibilities:
/// - topological readiness (Blocked -> Ready once all upstreams succeeded)
/// - applying task outcomes and the retry policy
/// - failing everything downstream of a terminal failure
/// - deciding the terminal state of the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub key: RunKey,
    pub state: WorkflowRunState,
    pub tasks: BTreeMap<TaskName, TaskRun>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// Create a `Pending` run. Tasks without dependencies start `Ready`,
    /// every other task `Blocked`.
    pub fn new(def: &WorkflowDefinition, scheduled_for: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let tasks = def
            .tasks()
            .iter()
            .map(|t| (t.id.clone(), TaskRun::new(t.id.clone(), !t.depends_on.is_empty())))
            .collect();

        Self {
            key: RunKey::new(def.id.clone(), scheduled_for),
            state: WorkflowRunState::Pending,
            tasks,
            created_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn task(&self, name: &str) -> Option<&TaskRun> {
        self.tasks.get(name)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move a `Pending` run to `Running` and return the tasks to dispatch.
    pub fn start(&mut self, def: &WorkflowDefinition, now: DateTime<Utc>) -> RunStep {
        if self.state != WorkflowRunState::Pending {
            return RunStep::ignored();
        }
        self.state = WorkflowRunState::Running;
        self.started_at = Some(now);
        info!(run = %self.key, "workflow run started");

        RunStep {
            newly_scheduled: self.start_ready(def, now),
            run_finished: self.finish_if_done(now),
            ..RunStep::default()
        }
    }

    /// Promote every `Blocked` task whose upstream tasks all `Succeeded` to
    /// `Ready`, returning the promoted names.
    pub fn ready_tasks(&mut self, def: &WorkflowDefinition) -> Vec<TaskName> {
        let candidates: Vec<TaskName> = self
            .tasks
            .values()
            .filter(|tr| tr.state == TaskRunState::Blocked)
            .filter(|tr| {
                def.graph().dependencies_of(&tr.task).iter().all(|dep| {
                    self.tasks
                        .get(dep)
                        .is_some_and(|d| d.state == TaskRunState::Succeeded)
                })
            })
            .map(|tr| tr.task.clone())
            .collect();

        for name in candidates.iter() {
            if let Some(tr) = self.tasks.get_mut(name) {
                debug!(run = %self.key, task = %name, "dependencies satisfied; marking Ready");
                tr.state = TaskRunState::Ready;
            }
        }

        candidates
    }

    /// Promote newly ready tasks, then hand out every `Ready` task as
    /// `Running`. Nothing is dispatched unless the run itself is `Running`.
    pub fn start_ready(
        &mut self,
        def: &WorkflowDefinition,
        now: DateTime<Utc>,
    ) -> Vec<ScheduledTask> {
        if self.state != WorkflowRunState::Running {
            return Vec::new();
        }

        self.ready_tasks(def);

        let mut scheduled = Vec::new();
        // Declaration order keeps dispatch deterministic.
        for task_def in def.tasks() {
            let Some(tr) = self.tasks.get_mut(&task_def.id) else {
                continue;
            };
            if tr.state != TaskRunState::Ready {
                continue;
            }
            tr.state = TaskRunState::Running;
            tr.started_at = Some(now);
            info!(
                run = %self.key,
                task = %tr.task,
                attempt = tr.attempt,
                "scheduling task"
            );
            scheduled.push(ScheduledTask::from_definition(&self.key, task_def, tr.attempt));
        }

        scheduled
    }

    /// Apply the outcome of one invocation of `task` at `attempt`.
    pub fn apply_outcome(
        &mut self,
        def: &WorkflowDefinition,
        task: &str,
        attempt: u32,
        outcome: TaskOutcome,
        now: DateTime<Utc>,
    ) -> RunStep {
        if self.is_terminal() {
            debug!(run = %self.key, task = %task, "outcome for finished run; ignoring");
            return RunStep::ignored();
        }

        let Some(tr) = self.tasks.get_mut(task) else {
            warn!(run = %self.key, task = %task, "outcome for unknown task; ignoring");
            return RunStep::ignored();
        };

        if tr.state != TaskRunState::Running || tr.attempt != attempt {
            debug!(
                run = %self.key,
                task = %task,
                attempt,
                current_attempt = tr.attempt,
                state = ?tr.state,
                "stale task outcome; ignoring"
            );
            return RunStep::ignored();
        }

        let mut step = RunStep::default();

        match outcome {
            TaskOutcome::Success { .. } => {
                tr.state = TaskRunState::Succeeded;
                tr.finished_at = Some(now);
                info!(run = %self.key, task = %task, attempt, "task succeeded");
                step.newly_scheduled = self.start_ready(def, now);
            }
            TaskOutcome::Failed { message } => {
                let policy = def
                    .task(task)
                    .map(|t| t.policy.retry.clone())
                    .unwrap_or_default();

                tr.last_error = message.clone();

                match policy.decide(attempt) {
                    RetryDecision::Retry {
                        next_attempt,
                        delay,
                    } => {
                        tr.state = TaskRunState::FailedRetryable;
                        tr.attempt = next_attempt;
                        tr.retry_at = chrono::Duration::from_std(delay)
                            .ok()
                            .and_then(|d| now.checked_add_signed(d));
                        warn!(
                            run = %self.key,
                            task = %task,
                            attempt,
                            next_attempt,
                            retry_delay = ?delay,
                            error = message.as_deref().unwrap_or(""),
                            "task failed; retry scheduled"
                        );
                        step.retries.push(RetryRequest {
                            task: task.to_string(),
                            attempt: next_attempt,
                            delay,
                            error: message,
                        });
                    }
                    RetryDecision::GiveUp => {
                        tr.state = TaskRunState::FailedTerminal;
                        tr.finished_at = Some(now);
                        warn!(
                            run = %self.key,
                            task = %task,
                            attempt,
                            error = message.as_deref().unwrap_or(""),
                            "task failed terminally; failing downstream tasks"
                        );
                        step.newly_failed.push(task.to_string());
                        step.skipped = self.fail_downstream(def, task, now);
                    }
                }
            }
        }

        step.run_finished = self.finish_if_done(now);
        step
    }

    /// Re-invoke a `FailedRetryable` task whose delay has elapsed.
    pub fn resume_retry(
        &mut self,
        def: &WorkflowDefinition,
        task: &str,
        attempt: u32,
        now: DateTime<Utc>,
    ) -> Option<ScheduledTask> {
        if self.state != WorkflowRunState::Running {
            return None;
        }
        let task_def = def.task(task)?;
        let tr = self.tasks.get_mut(task)?;
        if tr.state != TaskRunState::FailedRetryable || tr.attempt != attempt {
            debug!(run = %self.key, task = %task, attempt, "stale retry timer; ignoring");
            return None;
        }

        tr.state = TaskRunState::Running;
        tr.started_at = Some(now);
        tr.retry_at = None;
        info!(run = %self.key, task = %task, attempt, "retrying task");

        Some(ScheduledTask::from_definition(&self.key, task_def, attempt))
    }

    /// Mark every task reachable from `failed` as `FailedTerminal` without
    /// running it. Returns the names that changed.
    fn fail_downstream(
        &mut self,
        def: &WorkflowDefinition,
        failed: &str,
        now: DateTime<Utc>,
    ) -> Vec<TaskName> {
        let mut skipped = Vec::new();

        for name in def.graph().downstream_of(failed) {
            let Some(tr) = self.tasks.get_mut(&name) else {
                continue;
            };
            if tr.state.is_terminal() {
                continue;
            }
            tr.state = TaskRunState::FailedTerminal;
            tr.skipped = true;
            tr.finished_at = Some(now);
            tr.last_error = Some(format!("upstream task '{failed}' failed"));
            debug!(run = %self.key, task = %name, upstream = %failed, "skipped due to upstream failure");
            skipped.push(name);
        }

        skipped
    }

    /// Cancel the run. Every non-terminal task becomes `Cancelled`; the
    /// returned tasks had an invocation in flight.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Vec<(TaskName, u32)> {
        if self.is_terminal() {
            return Vec::new();
        }

        let mut in_flight = Vec::new();
        for tr in self.tasks.values_mut() {
            if tr.state.is_terminal() {
                continue;
            }
            if tr.state == TaskRunState::Running {
                in_flight.push((tr.task.clone(), tr.attempt));
            }
            tr.state = TaskRunState::Cancelled;
            tr.finished_at = Some(now);
            tr.retry_at = None;
        }

        self.state = WorkflowRunState::Cancelled;
        self.finished_at = Some(now);
        info!(run = %self.key, in_flight = in_flight.len(), "workflow run cancelled");

        in_flight
    }

    /// Re-arm a run loaded from the store after a restart.
    ///
    /// Tasks that were `Running` lost their invocation and are dispatched
    /// again at the same attempt; `FailedRetryable` tasks get a retry for the
    /// remaining part of their delay.
    pub fn resume(&mut self, def: &WorkflowDefinition, now: DateTime<Utc>) -> RunStep {
        if self.state != WorkflowRunState::Running {
            return RunStep::ignored();
        }

        let mut step = RunStep::default();

        for task_def in def.tasks() {
            let Some(tr) = self.tasks.get_mut(&task_def.id) else {
                continue;
            };
            match tr.state {
                TaskRunState::Running => {
                    info!(run = %self.key, task = %tr.task, attempt = tr.attempt, "re-dispatching interrupted task");
                    tr.started_at = Some(now);
                    step.newly_scheduled.push(ScheduledTask::from_definition(
                        &self.key,
                        task_def,
                        tr.attempt,
                    ));
                }
                TaskRunState::FailedRetryable => {
                    let delay = tr
                        .retry_at
                        .and_then(|at| (at - now).to_std().ok())
                        .unwrap_or_default();
                    step.retries.push(RetryRequest {
                        task: tr.task.clone(),
                        attempt: tr.attempt,
                        delay,
                        error: tr.last_error.clone(),
                    });
                }
                _ => {}
            }
        }

        step.newly_scheduled.extend(self.start_ready(def, now));
        step.run_finished = self.finish_if_done(now);
        step
    }

    /// Set the terminal state once no task can make progress.
    fn finish_if_done(&mut self, now: DateTime<Utc>) -> Option<WorkflowRunState> {
        if self.state != WorkflowRunState::Running {
            return None;
        }
        if self.tasks.values().any(|tr| !tr.state.is_terminal()) {
            return None;
        }

        let all_succeeded = self
            .tasks
            .values()
            .all(|tr| tr.state == TaskRunState::Succeeded);

        self.state = if all_succeeded {
            WorkflowRunState::Succeeded
        } else {
            WorkflowRunState::Failed
        };
        self.finished_at = Some(now);
        info!(run = %self.key, state = ?self.state, "workflow run finished");

        Some(self.state)
    }

    /// Tasks that failed on their own (not skipped because of an upstream).
    pub fn failed_tasks(&self) -> Vec<TaskName> {
        self.tasks
            .values()
            .filter(|tr| tr.state == TaskRunState::FailedTerminal && !tr.skipped)
            .map(|tr| tr.task.clone())
            .collect()
    }
}
