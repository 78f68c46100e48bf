// src/exec/executor_loop.rs

//! Main executor loop that manages in-flight task invocations.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, info};

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::exec::task_runner::run_task;
use crate::exec::TaskExecutor;
use crate::types::{RunKey, TaskName};

/// Requests accepted by the executor loop.
#[derive(Debug)]
pub enum ExecutorMessage {
    Run(ScheduledTask),
    Cancel { run: RunKey, tasks: Vec<TaskName> },
}

type InvocationKey = (RunKey, TaskName, u32);

/// Internal handle for a currently-running invocation.
///
/// - `cancel` is used by the executor to request that the invocation stop.
/// - `handle` is the Tokio task that is actually running it.
struct ActiveTask {
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// The returned sender is what [`WorkerPool`](super::WorkerPool) uses to
/// talk to the loop. Each scheduled task is executed in its own Tokio task,
/// and there is never more than one invocation per `(run, task, attempt)`;
/// a duplicate dispatch while one is still in flight is ignored.
pub fn spawn_executor(
    executor: Arc<dyn TaskExecutor>,
    max_concurrency: usize,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> mpsc::Sender<ExecutorMessage> {
    let (tx, mut rx) = mpsc::channel::<ExecutorMessage>(64);
    let permits = Arc::new(Semaphore::new(max_concurrency));

    tokio::spawn(async move {
        info!(max_concurrency, "executor loop started");

        let mut active: HashMap<InvocationKey, ActiveTask> = HashMap::new();

        while let Some(message) = rx.recv().await {
            active.retain(|_, a| !a.handle.is_finished());

            match message {
                ExecutorMessage::Run(task) => {
                    handle_scheduled_task(task, &mut active, &executor, &permits, &runtime_tx)
                }
                ExecutorMessage::Cancel { run, tasks } => {
                    let keys: Vec<InvocationKey> = active
                        .keys()
                        .filter(|(r, t, _)| *r == run && tasks.contains(t))
                        .cloned()
                        .collect();
                    for key in keys {
                        if let Some(existing) = active.remove(&key) {
                            cancel_active_task(&key.0, &key.1, existing);
                        }
                    }
                }
            }
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

/// Handle a newly scheduled task.
fn handle_scheduled_task(
    task: ScheduledTask,
    active: &mut HashMap<InvocationKey, ActiveTask>,
    executor: &Arc<dyn TaskExecutor>,
    permits: &Arc<Semaphore>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) {
    let key = (task.run.clone(), task.task.clone(), task.attempt);

    if active.contains_key(&key) {
        debug!(
            run = %task.run,
            task = %task.task,
            attempt = task.attempt,
            "invocation already in flight; ignoring duplicate dispatch"
        );
        return;
    }

    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let executor = Arc::clone(executor);
    let permits = Arc::clone(permits);
    let rt_tx = runtime_tx.clone();

    let handle = tokio::spawn(async move {
        let run = task.run.clone();
        let name = task.task.clone();
        run_task(executor, task, permits, rt_tx, cancel_rx).await;
        debug!(run = %run, task = %name, "task runner future finished");
    });

    active.insert(
        key,
        ActiveTask {
            cancel: Some(cancel_tx),
            handle,
        },
    );
}

/// Cancel an in-flight invocation.
fn cancel_active_task(run: &RunKey, task: &str, mut existing: ActiveTask) {
    info!(run = %run, task = %task, "cancelling in-flight task invocation");

    match existing.cancel.take() {
        Some(cancel) => {
            if cancel.send(()).is_err() {
                debug!(run = %run, task = %task, "invocation already finished while cancelling");
            }
        }
        None => debug!(run = %run, task = %task, "no cancel sender present; already cancelled"),
    }
}
