// tests/runtime_fake_executor.rs

//! Full runtime (core, shell, worker pool) with a scripted executor.

use std::time::Duration;

use crondag::dag::{TaskSpec, WorkflowBuilder};
use crondag::engine::RuntimeOptions;
use crondag::notify::NotificationKind;
use crondag::types::{RunKey, TaskRunState, WorkflowRunState};
use crondag_test_utils::builders::{chain, diamond, manual_instant, manual_options};
use crondag_test_utils::fake_executor::{ScriptedExecutor, Step};
use crondag_test_utils::harness::Harness;
use crondag_test_utils::{init_tracing, with_timeout};

#[tokio::test]
async fn diamond_runs_in_dependency_order() {
    init_tracing();

    let mut harness = Harness::start(vec![diamond("wf")], ScriptedExecutor::new(), manual_options());
    harness.handle.trigger("wf", manual_instant()).await.unwrap();
    with_timeout(harness.wait()).await.unwrap();

    let executed = harness.executor.executed();
    assert_eq!(executed.len(), 4);
    assert_eq!(executed.first().map(String::as_str), Some("A"));
    assert_eq!(executed.last().map(String::as_str), Some("D"));

    let run = harness
        .store
        .get(&RunKey::new("wf", manual_instant()))
        .unwrap()
        .expect("run persisted");
    assert_eq!(run.state, WorkflowRunState::Succeeded);
    assert!(run.finished_at.is_some());
    assert!(harness.notifier.all().is_empty());
}

#[tokio::test(start_paused = true)]
async fn retry_waits_for_the_delay() {
    init_tracing();

    let def = WorkflowBuilder::new("wf")
        .task(
            TaskSpec::new("A", "flaky")
                .retries(2)
                .retry_delay(Duration::from_secs(5)),
        )
        .build()
        .unwrap();
    let executor = ScriptedExecutor::new().fail_times("A", 1);

    let mut harness = Harness::start(vec![def], executor, manual_options());
    harness.handle.trigger("wf", manual_instant()).await.unwrap();
    harness.wait().await.unwrap();

    let calls = harness.executor.invocations_of("A");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].attempt, 0);
    assert_eq!(calls[1].attempt, 1);
    assert!(calls[1].started - calls[0].started >= Duration::from_secs(5));

    let run = harness
        .store
        .get(&RunKey::new("wf", manual_instant()))
        .unwrap()
        .unwrap();
    assert_eq!(run.state, WorkflowRunState::Succeeded);
    assert_eq!(run.task("A").unwrap().attempt, 1);
}

#[tokio::test]
async fn exhausted_retries_fail_the_run_and_notify() {
    init_tracing();

    let def = WorkflowBuilder::new("wf")
        .task(
            TaskSpec::new("A", "broken")
                .retries(1)
                .retry_delay(Duration::from_millis(10))
                .alert_on_retry(true)
                .alert_on_failure(true),
        )
        .task(TaskSpec::new("B", "echo B").after("A"))
        .build()
        .unwrap();
    let executor = ScriptedExecutor::new().always_fail("A");

    let mut harness = Harness::start(vec![def], executor, manual_options());
    harness.handle.trigger("wf", manual_instant()).await.unwrap();
    with_timeout(harness.wait()).await.unwrap();

    assert_eq!(harness.executor.executed(), ["A", "A"]);

    let retries = harness.notifier.of_kind(NotificationKind::RetryOccurred);
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].attempt, 0);
    let failures = harness.notifier.of_kind(NotificationKind::TaskFailedTerminal);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].task, "A");
    assert_eq!(failures[0].attempt, 1);

    let run = harness
        .store
        .get(&RunKey::new("wf", manual_instant()))
        .unwrap()
        .unwrap();
    assert_eq!(run.state, WorkflowRunState::Failed);
    let b = run.task("B").unwrap();
    assert_eq!(b.state, TaskRunState::FailedTerminal);
    assert!(b.skipped);
}

#[tokio::test]
async fn cancel_stops_a_hanging_run() {
    init_tracing();

    let executor = ScriptedExecutor::new().hang("A");
    let mut harness = Harness::start(vec![chain("wf", &["A", "B"])], executor, manual_options());
    harness.handle.trigger("wf", manual_instant()).await.unwrap();

    with_timeout(harness.executor.wait_for_invocations(1)).await;
    let key = RunKey::new("wf", manual_instant());
    harness.handle.cancel(key.clone()).await.unwrap();
    with_timeout(harness.wait()).await.unwrap();

    let run = harness.store.get(&key).unwrap().unwrap();
    assert_eq!(run.state, WorkflowRunState::Cancelled);
    assert!(run.tasks.values().all(|t| t.state.is_terminal()));
    assert_eq!(harness.executor.executed(), ["A"]);
}

#[tokio::test]
async fn execution_timeout_fails_the_attempt() {
    init_tracing();

    let def = WorkflowBuilder::new("wf")
        .task(TaskSpec::new("A", "sleep forever").execution_timeout(Duration::from_millis(50)))
        .build()
        .unwrap();
    let executor = ScriptedExecutor::new().hang("A");

    let mut harness = Harness::start(vec![def], executor, manual_options());
    harness.handle.trigger("wf", manual_instant()).await.unwrap();
    with_timeout(harness.wait()).await.unwrap();

    let run = harness
        .store
        .get(&RunKey::new("wf", manual_instant()))
        .unwrap()
        .unwrap();
    assert_eq!(run.state, WorkflowRunState::Failed);
    let error = run.task("A").unwrap().last_error.clone().unwrap_or_default();
    assert!(error.contains("timed out"), "unexpected error: {error}");
}

#[tokio::test]
async fn slow_tasks_still_complete_in_order() {
    init_tracing();

    let executor = ScriptedExecutor::new()
        .script("A", [Step::After(Duration::from_millis(30), Box::new(Step::Succeed))])
        .script("B", [Step::After(Duration::from_millis(10), Box::new(Step::Succeed))]);

    let mut harness = Harness::start(vec![chain("wf", &["A", "B", "C"])], executor, manual_options());
    harness.handle.trigger("wf", manual_instant()).await.unwrap();
    with_timeout(harness.wait()).await.unwrap();

    assert_eq!(harness.executor.executed(), ["A", "B", "C"]);
}

#[tokio::test]
async fn shutdown_stops_a_daemon() {
    init_tracing();

    let options = RuntimeOptions {
        exit_when_idle: false,
        tick_interval: Some(Duration::from_millis(20)),
    };
    let mut harness = Harness::start(vec![chain("wf", &["A"])], ScriptedExecutor::new(), options);

    harness.handle.shutdown().await.unwrap();
    with_timeout(harness.wait()).await.unwrap();

    // Manual-only workflow: ticks never create runs.
    assert!(harness.executor.executed().is_empty());
}
