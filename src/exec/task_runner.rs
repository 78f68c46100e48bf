// src/exec/task_runner.rs

//! Individual task invocation runner.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::exec::TaskExecutor;

/// Run a single invocation and emit its `TaskCompleted` event.
///
/// - Waits for a worker permit first; cancellation while waiting is honored.
/// - Applies the task's `execution_timeout`; exceeding it fails the
///   invocation with "timed out after ...".
/// - If the cancel channel fires, the executor future is dropped (which
///   kills a child process) and **no** `TaskCompleted` event is sent. The
///   core already marked the task `Cancelled`.
pub async fn run_task(
    executor: Arc<dyn TaskExecutor>,
    task: ScheduledTask,
    permits: Arc<Semaphore>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let permit = tokio::select! {
        permit = permits.acquire_owned() => permit,
        _ = &mut cancel_rx => {
            debug!(run = %task.run, task = %task.task, "cancelled while waiting for a worker");
            return;
        }
    };
    let Ok(_permit) = permit else {
        warn!(run = %task.run, task = %task.task, "worker pool closed; dropping task");
        return;
    };

    let invocation = async {
        match task.timeout {
            Some(limit) => match tokio::time::timeout(limit, executor.execute(&task)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(run = %task.run, task = %task.task, timeout = ?limit, "task timed out");
                    TaskOutcome::failed(format!("timed out after {limit:?}"))
                }
            },
            None => executor.execute(&task).await,
        }
    };

    let outcome = tokio::select! {
        outcome = invocation => outcome,
        cancel = &mut cancel_rx => {
            match cancel {
                Ok(()) => info!(
                    run = %task.run,
                    task = %task.task,
                    attempt = task.attempt,
                    "invocation cancelled"
                ),
                Err(_) => debug!(
                    run = %task.run,
                    task = %task.task,
                    "cancel channel closed without explicit cancellation"
                ),
            }
            return;
        }
    };

    debug!(
        run = %task.run,
        task = %task.task,
        attempt = task.attempt,
        success = outcome.is_success(),
        "invocation finished"
    );

    let event = RuntimeEvent::TaskCompleted {
        run: task.run.clone(),
        task: task.task.clone(),
        attempt: task.attempt,
        outcome,
    };
    if runtime_tx.send(event).await.is_err() {
        debug!(run = %task.run, task = %task.task, "runtime gone; completion dropped");
    }
}
