// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::dag::{ScheduledTask, WorkflowRun};
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::notify::Notifier;
use crate::store::RunStore;
use crate::types::{RunKey, TaskName, WorkflowRunState};

use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent};

/// Drives the core runtime in response to `RuntimeEvent`s and periodic
/// ticks, and delegates side effects to the executor backend, the run store
/// and the notifier.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. The shell is the single owner of the core, so every
/// run state transition happens on this one task.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    /// Used by retry timers; weak so it does not keep the channel open.
    event_tx: mpsc::WeakSender<RuntimeEvent>,
    executor: E,
    store: Arc<dyn RunStore>,
    notifier: Arc<dyn Notifier>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        event_tx: &mpsc::Sender<RuntimeEvent>,
        executor: E,
        store: Arc<dyn RunStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            core,
            event_rx,
            event_tx: event_tx.downgrade(),
            executor,
            store,
            notifier,
        }
    }

    /// Main event loop.
    ///
    /// - Resumes unfinished runs from the run store.
    /// - Consumes `RuntimeEvent`s from `event_rx` and ticks every
    ///   `tick_interval`.
    /// - Feeds them into the core runtime.
    /// - Executes commands returned by the core (dispatch, retry timers,
    ///   persistence, notifications, exit).
    pub async fn run(mut self) -> Result<()> {
        info!("crondag runtime started");

        let stored = self
            .store
            .list(None)
            .context("loading runs from the run store")?;
        if !stored.is_empty() {
            info!(runs = stored.len(), "loaded runs from the run store");
        }
        let step = self.core.resume(stored, Utc::now());
        for command in step.commands {
            self.execute_command(command).await?;
        }

        let mut ticker = self.core.options().tick_interval.map(ticker);

        loop {
            let event = tokio::select! {
                event = self.event_rx.recv() => match event {
                    Some(e) => e,
                    None => {
                        info!("runtime event channel closed; exiting");
                        break;
                    }
                },
                _ = next_tick(&mut ticker) => RuntimeEvent::Tick,
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event, Utc::now());

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
        Ok(())
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => self.spawn_ready(tasks).await?,
            CoreCommand::ScheduleRetry {
                run,
                task,
                attempt,
                delay,
            } => self.schedule_retry(run, task, attempt, delay),
            CoreCommand::CancelTasks { run, tasks } => {
                debug!(run = %run, ?tasks, "cancelling in-flight tasks");
                self.executor.cancel_tasks(run, tasks).await?;
            }
            CoreCommand::Notify(notification) => self.notifier.notify(&notification),
            CoreCommand::Persist(run) => self.persist(&run),
            CoreCommand::RunFinished {
                run,
                state,
                failure,
            } => match (state, failure) {
                (WorkflowRunState::Failed, Some(failure)) => {
                    error!(run = %run, failed_tasks = ?failure.failed_tasks, "{failure}")
                }
                (state, _) => info!(run = %run, ?state, "workflow run finished"),
            },
            CoreCommand::RequestExit => {
                // The core already returns keep_running=false in this case.
                info!("no active runs left; exit requested");
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = tasks
            .iter()
            .map(|t| format!("{}:{}#{}", t.run, t.task, t.attempt))
            .collect();
        debug!(?names, "dispatching ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }

    /// Arm a timer that feeds `RetryDue` back into the loop. The loop itself
    /// never waits for the delay.
    fn schedule_retry(&self, run: RunKey, task: TaskName, attempt: u32, delay: Duration) {
        debug!(run = %run, task = %task, attempt, ?delay, "arming retry timer");
        let tx = self.event_tx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(tx) = tx.upgrade() else {
                return;
            };
            if tx
                .send(RuntimeEvent::RetryDue { run, task, attempt })
                .await
                .is_err()
            {
                debug!("runtime gone before retry was due");
            }
        });
    }

    fn persist(&self, run: &WorkflowRun) {
        if let Err(err) = self.store.save(run) {
            warn!(run = %run.key, error = %err, "failed to persist workflow run");
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// First tick fires immediately; without a ticker this never resolves.
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
