use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use crondag::engine::TaskOutcome;
use crondag::exec::{ExecutionRequest, TaskExecutor};
use crondag::types::RunKey;
use tokio::time::Instant;

/// What the fake does for one invocation of a task.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(String),
    /// Never finishes; only cancellation or a timeout ends it.
    Hang,
    /// Sleep, then behave like the inner step.
    After(Duration, Box<Step>),
}

/// One recorded call to [`ScriptedExecutor::execute`].
#[derive(Debug, Clone)]
pub struct Invocation {
    pub run: RunKey,
    pub task: String,
    pub attempt: u32,
    /// Tokio clock at the start of the call (follows a paused clock).
    pub started: Instant,
}

/// A fake task executor that:
/// - records every invocation
/// - plays a per-task script of steps, then succeeds once the script runs
///   out (unless the task is marked as always failing).
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    always_fail: Mutex<Vec<String>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue steps for `task`, consumed one per invocation.
    pub fn script(self, task: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(task.to_string())
            .or_default()
            .extend(steps);
        self
    }

    /// Fail the first `times` invocations of `task`.
    pub fn fail_times(self, task: &str, times: usize) -> Self {
        let steps = (0..times).map(|i| Step::Fail(format!("{task} failure #{}", i + 1)));
        self.script(task, steps)
    }

    pub fn always_fail(self, task: &str) -> Self {
        self.always_fail.lock().unwrap().push(task.to_string());
        self
    }

    pub fn hang(self, task: &str) -> Self {
        self.script(task, [Step::Hang])
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invocations_of(&self, task: &str) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|i| i.task == task)
            .collect()
    }

    /// Task ids in invocation order.
    pub fn executed(&self) -> Vec<String> {
        self.invocations().into_iter().map(|i| i.task).collect()
    }

    /// Poll until at least `n` invocations were recorded.
    pub async fn wait_for_invocations(&self, n: usize) {
        while self.invocations.lock().unwrap().len() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn next_step(&self, task: &str) -> Step {
        if self.always_fail.lock().unwrap().iter().any(|t| t == task) {
            return Step::Fail(format!("{task} always fails"));
        }
        self.scripts
            .lock()
            .unwrap()
            .get_mut(task)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(Step::Succeed)
    }
}

async fn play(step: Step) -> TaskOutcome {
    let mut step = step;
    loop {
        match step {
            Step::Succeed => return TaskOutcome::success(),
            Step::Fail(message) => return TaskOutcome::failed(message),
            Step::Hang => std::future::pending::<()>().await,
            Step::After(delay, inner) => {
                tokio::time::sleep(delay).await;
                step = *inner;
            }
        }
    }
}

impl TaskExecutor for ScriptedExecutor {
    fn execute<'a>(
        &'a self,
        request: &'a ExecutionRequest,
    ) -> Pin<Box<dyn Future<Output = TaskOutcome> + Send + 'a>> {
        self.invocations.lock().unwrap().push(Invocation {
            run: request.run.clone(),
            task: request.task.clone(),
            attempt: request.attempt,
            started: Instant::now(),
        });
        let step = self.next_step(&request.task);

        Box::pin(play(step))
    }
}
