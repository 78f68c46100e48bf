// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::dag::{RunStep, ScheduledTask, WorkflowRun};
use crate::engine::core::ActiveRun;
use crate::engine::{RunKey, TaskName, TaskOutcome, WorkflowId};
use crate::errors::WorkflowFailure;
use crate::notify::{Notification, NotificationKind};
use crate::schedule::Scheduler;
use crate::types::WorkflowRunState;

/// Active (pending or running) workflow runs, keyed and ordered by run key.
pub type ActiveRuns = BTreeMap<RunKey, ActiveRun>;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the worker pool.
    DispatchTasks(Vec<ScheduledTask>),
    /// Emit `RetryDue` for this task once `delay` has elapsed.
    ScheduleRetry {
        run: RunKey,
        task: TaskName,
        attempt: u32,
        delay: Duration,
    },
    /// Cancel in-flight invocations of these tasks.
    CancelTasks { run: RunKey, tasks: Vec<TaskName> },
    /// Hand a notification to the notifier.
    Notify(Notification),
    /// Write the run record to the store.
    Persist(Box<WorkflowRun>),
    /// A run reached a terminal state.
    RunFinished {
        run: RunKey,
        state: WorkflowRunState,
        failure: Option<WorkflowFailure>,
    },
    /// Request that the process exits (used for `--once` when idle).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub fn proceed(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    /// Tasks dispatched by this step, flattened.
    pub fn dispatched(&self) -> Vec<&ScheduledTask> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchTasks(tasks) => Some(tasks.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

/// Handle a scheduler tick: create every due run, then start what fits.
pub fn handle_tick(scheduler: &mut Scheduler, runs: &mut ActiveRuns, now: DateTime<Utc>) -> CoreStep {
    let mut commands = Vec::new();

    for key in scheduler.due_runs(now) {
        create_run(scheduler, runs, key, now, &mut commands);
    }
    activate_pending(runs, now, &mut commands);

    CoreStep::proceed(commands)
}

/// Handle a manual run request.
pub fn handle_run_requested(
    scheduler: &mut Scheduler,
    runs: &mut ActiveRuns,
    workflow_id: WorkflowId,
    scheduled_for: DateTime<Utc>,
    now: DateTime<Utc>,
) -> CoreStep {
    let mut commands = Vec::new();

    match scheduler.request_run(&workflow_id, scheduled_for) {
        Ok(Some(key)) => {
            create_run(scheduler, runs, key, now, &mut commands);
            activate_pending(runs, now, &mut commands);
        }
        Ok(None) => {}
        Err(err) => warn!(workflow = %workflow_id, error = %err, "run request rejected"),
    }

    CoreStep::proceed(commands)
}

/// Handle the outcome of one task invocation.
pub fn handle_task_completion(
    runs: &mut ActiveRuns,
    run: RunKey,
    task: TaskName,
    attempt: u32,
    outcome: TaskOutcome,
    now: DateTime<Utc>,
) -> CoreStep {
    let mut commands = Vec::new();

    let Some(active) = runs.get_mut(&run) else {
        debug!(run = %run, task = %task, "completion for inactive run; ignoring");
        return CoreStep::proceed(commands);
    };

    let step = active.run.apply_outcome(&active.def, &task, attempt, outcome, now);
    if step.ignored {
        return CoreStep::proceed(commands);
    }

    let finished = apply_run_step(active, step, true, &mut commands);
    if finished {
        runs.remove(&run);
        activate_pending(runs, now, &mut commands);
    }

    CoreStep::proceed(commands)
}

/// Handle an elapsed retry delay.
pub fn handle_retry_due(
    runs: &mut ActiveRuns,
    run: RunKey,
    task: TaskName,
    attempt: u32,
    now: DateTime<Utc>,
) -> CoreStep {
    let mut commands = Vec::new();

    let Some(active) = runs.get_mut(&run) else {
        debug!(run = %run, task = %task, "retry for inactive run; ignoring");
        return CoreStep::proceed(commands);
    };

    if let Some(scheduled) = active.run.resume_retry(&active.def, &task, attempt, now) {
        commands.push(CoreCommand::DispatchTasks(vec![scheduled]));
        commands.push(CoreCommand::Persist(Box::new(active.run.clone())));
    }

    CoreStep::proceed(commands)
}

/// Handle a cancellation request.
pub fn handle_cancel(runs: &mut ActiveRuns, run: RunKey, now: DateTime<Utc>) -> CoreStep {
    let mut commands = Vec::new();

    let Some(mut active) = runs.remove(&run) else {
        warn!(run = %run, "cancel requested for unknown or finished run; ignoring");
        return CoreStep::proceed(commands);
    };

    let in_flight = active.run.cancel(now);
    if !in_flight.is_empty() {
        commands.push(CoreCommand::CancelTasks {
            run: run.clone(),
            tasks: in_flight.into_iter().map(|(task, _)| task).collect(),
        });
    }
    commands.push(CoreCommand::Persist(Box::new(active.run.clone())));
    commands.push(CoreCommand::RunFinished {
        run,
        state: WorkflowRunState::Cancelled,
        failure: None,
    });

    activate_pending(runs, now, &mut commands);
    CoreStep::proceed(commands)
}

/// Re-arm runs loaded from the store after a restart.
pub fn resume_runs(
    scheduler: &mut Scheduler,
    runs: &mut ActiveRuns,
    stored: Vec<WorkflowRun>,
    now: DateTime<Utc>,
) -> CoreStep {
    let mut commands = Vec::new();

    scheduler.seed(stored.iter().map(|r| r.key.clone()));

    for run in stored.into_iter().filter(|r| !r.is_terminal()) {
        let Some(def) = scheduler.registry().get(&run.key.workflow_id) else {
            warn!(run = %run.key, "stored run belongs to an unknown workflow; not resuming");
            continue;
        };
        let same_tasks = run.tasks.len() == def.tasks().len()
            && def.tasks().iter().all(|t| run.tasks.contains_key(&t.id));
        if !same_tasks {
            warn!(run = %run.key, "workflow tasks changed since the run was stored; not resuming");
            continue;
        }

        let key = run.key.clone();
        let mut active = ActiveRun { def, run };
        let step = active.run.resume(&active.def, now);
        let finished = if step.ignored {
            false
        } else {
            apply_run_step(&active, step, false, &mut commands)
        };
        if !finished {
            runs.insert(key, active);
        }
    }

    activate_pending(runs, now, &mut commands);
    CoreStep::proceed(commands)
}

fn create_run(
    scheduler: &Scheduler,
    runs: &mut ActiveRuns,
    key: RunKey,
    now: DateTime<Utc>,
    commands: &mut Vec<CoreCommand>,
) {
    let Some(def) = scheduler.registry().get(&key.workflow_id) else {
        warn!(run = %key, "due run for unknown workflow; ignoring");
        return;
    };

    let run = WorkflowRun::new(&def, key.scheduled_for, now);
    commands.push(CoreCommand::Persist(Box::new(run.clone())));
    runs.insert(key, ActiveRun { def, run });
}

/// Start pending runs, oldest first, while their workflow is below
/// `max_active_runs`.
fn activate_pending(runs: &mut ActiveRuns, now: DateTime<Utc>, commands: &mut Vec<CoreCommand>) {
    let mut running: HashMap<String, usize> = HashMap::new();
    for active in runs.values() {
        if active.run.state == WorkflowRunState::Running {
            *running.entry(active.run.key.workflow_id.clone()).or_default() += 1;
        }
    }

    let mut finished = Vec::new();

    for (key, active) in runs.iter_mut() {
        if active.run.state != WorkflowRunState::Pending {
            continue;
        }
        let count = running.entry(key.workflow_id.clone()).or_default();
        if *count >= active.def.max_active_runs {
            debug!(run = %key, "max_active_runs reached; run stays pending");
            continue;
        }
        *count += 1;

        let step = active.run.start(&active.def, now);
        if apply_run_step(active, step, true, commands) {
            finished.push(key.clone());
        }
    }

    for key in finished {
        runs.remove(&key);
    }
}

/// Turn a run step into commands. Returns `true` if the run finished.
fn apply_run_step(
    active: &ActiveRun,
    step: RunStep,
    announce: bool,
    commands: &mut Vec<CoreCommand>,
) -> bool {
    let run = &active.run;

    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }

    for retry in step.retries {
        let policy = active.def.task(&retry.task).map(|t| &t.policy);
        if announce && policy.is_some_and(|p| p.retry.alert_on_retry) {
            commands.push(CoreCommand::Notify(Notification {
                kind: NotificationKind::RetryOccurred,
                run: run.key.clone(),
                task: retry.task.clone(),
                owner: policy.map(|p| p.owner.clone()).unwrap_or_default(),
                attempt: retry.attempt.saturating_sub(1),
                error: retry.error.clone(),
            }));
        }
        commands.push(CoreCommand::ScheduleRetry {
            run: run.key.clone(),
            task: retry.task,
            attempt: retry.attempt,
            delay: retry.delay,
        });
    }

    for task in step.newly_failed {
        let policy = active.def.task(&task).map(|t| &t.policy);
        if announce && policy.is_some_and(|p| p.retry.alert_on_failure) {
            let task_run = run.task(&task);
            commands.push(CoreCommand::Notify(Notification {
                kind: NotificationKind::TaskFailedTerminal,
                run: run.key.clone(),
                task: task.clone(),
                owner: policy.map(|p| p.owner.clone()).unwrap_or_default(),
                attempt: task_run.map(|t| t.attempt).unwrap_or_default(),
                error: task_run.and_then(|t| t.last_error.clone()),
            }));
        }
    }

    commands.push(CoreCommand::Persist(Box::new(run.clone())));

    match step.run_finished {
        Some(state) => {
            let failure = (state == WorkflowRunState::Failed).then(|| WorkflowFailure {
                run: run.key.clone(),
                failed_tasks: run.failed_tasks(),
            });
            commands.push(CoreCommand::RunFinished {
                run: run.key.clone(),
                state,
                failure,
            });
            true
        }
        None => false,
    }
}

