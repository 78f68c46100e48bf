// tests/shell_executor.rs

#![cfg(unix)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crondag::dag::{TaskSpec, WorkflowBuilder};
use crondag::engine::{CoreRuntime, Runtime, RuntimeHandle, TaskOutcome};
use crondag::exec::{ExecutionRequest, ShellExecutor, TaskExecutor, WorkerPool};
use crondag::notify::LogNotifier;
use crondag::registry::WorkflowRegistry;
use crondag::schedule::Scheduler;
use crondag::store::{MemoryRunStore, RunStore};
use crondag::types::{RunKey, WorkflowRunState};
use crondag_test_utils::builders::{manual_instant, manual_options};
use crondag_test_utils::{init_tracing, with_timeout};
use tokio::sync::mpsc;

fn request(command: &str, attempt: u32) -> ExecutionRequest {
    ExecutionRequest {
        run: RunKey::new("wf", manual_instant()),
        task: "t".to_string(),
        command: command.to_string(),
        env: BTreeMap::from([("GREETING".to_string(), "hello".to_string())]),
        attempt,
        timeout: None,
    }
}

#[tokio::test]
async fn zero_exit_succeeds() {
    let outcome = ShellExecutor::new().execute(&request("true", 0)).await;
    assert!(outcome.is_success());
}

#[tokio::test]
async fn failure_reports_exit_code_and_last_stderr_line() {
    let outcome = ShellExecutor::new()
        .execute(&request("echo first >&2; echo boom >&2; exit 3", 0))
        .await;
    assert_eq!(outcome, TaskOutcome::failed("exit code 3: boom"));
}

#[tokio::test]
async fn failure_without_stderr_reports_exit_code() {
    let outcome = ShellExecutor::new().execute(&request("exit 2", 0)).await;
    assert_eq!(outcome, TaskOutcome::failed("exit code 2"));
}

#[tokio::test]
async fn run_context_is_exported_to_the_process() {
    let script = r#"
        test "$CRONDAG_WORKFLOW_ID" = wf || { echo "bad workflow $CRONDAG_WORKFLOW_ID" >&2; exit 1; }
        test "$CRONDAG_TASK_ID" = t || { echo "bad task $CRONDAG_TASK_ID" >&2; exit 1; }
        test "$CRONDAG_ATTEMPT" = 2 || { echo "bad attempt $CRONDAG_ATTEMPT" >&2; exit 1; }
        case "$CRONDAG_SCHEDULED_FOR" in 2024-01-01T06:00:00*) ;; *) echo "bad instant" >&2; exit 1;; esac
        test "$GREETING" = hello || { echo "bad env" >&2; exit 1; }
    "#;
    let outcome = ShellExecutor::new().execute(&request(script, 2)).await;
    assert_eq!(outcome, TaskOutcome::success());
}

#[tokio::test]
async fn shell_tasks_run_through_the_runtime() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("order.txt");
    let append = |name: &str| format!("echo {name} >> '{}'", marker.display());

    let def = WorkflowBuilder::new("wf")
        .task(TaskSpec::new("A", append("A")))
        .task(TaskSpec::new("B", append("B")).after("A"))
        .task(
            TaskSpec::new("C", "sleep 5")
                .after("B")
                .execution_timeout(Duration::from_millis(200)),
        )
        .build()
        .unwrap();

    let store: Arc<dyn RunStore> = Arc::new(MemoryRunStore::new());
    let (tx, rx) = mpsc::channel(16);
    let pool = WorkerPool::new(Arc::new(ShellExecutor::new()), 2, tx.clone());
    let core = CoreRuntime::new(
        Scheduler::new(WorkflowRegistry::from_definitions([def])),
        manual_options(),
    );
    let runtime = Runtime::new(core, rx, &tx, pool, store.clone(), Arc::new(LogNotifier));
    let join = tokio::spawn(runtime.run());

    RuntimeHandle::new(tx).trigger("wf", manual_instant()).await.unwrap();
    with_timeout(join).await.unwrap().unwrap();

    assert_eq!(std::fs::read_to_string(&marker).unwrap(), "A\nB\n");

    let run = store
        .get(&RunKey::new("wf", manual_instant()))
        .unwrap()
        .unwrap();
    assert_eq!(run.state, WorkflowRunState::Failed);
    let c = run.task("C").unwrap();
    assert!(c.last_error.as_deref().unwrap_or("").contains("timed out"));
}
