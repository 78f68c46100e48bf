// tests/file_store_resume.rs

use std::fs;
use std::sync::Arc;

use crondag::dag::WorkflowRun;
use crondag::engine::TaskOutcome;
use crondag::status::{format_statuses, get_run_status, list_run_statuses};
use crondag::store::{FileRunStore, RunStore};
use crondag::types::{RunKey, TaskRunState, WorkflowRunState};
use crondag_test_utils::builders::{at, chain, manual_instant, manual_options};
use crondag_test_utils::fake_executor::ScriptedExecutor;
use crondag_test_utils::harness::Harness;
use crondag_test_utils::{init_tracing, with_timeout};

/// Run of `A -> B -> C` where A succeeded and B was running when the
/// process went away.
fn interrupted_run() -> WorkflowRun {
    let def = chain("wf", &["A", "B", "C"]);
    let t = at("2024-01-01T06:00:05Z");
    let mut run = WorkflowRun::new(&def, manual_instant(), t);
    run.start(&def, t);
    run.apply_outcome(&def, "A", 0, TaskOutcome::success(), t);
    run
}

#[test]
fn file_store_round_trips_and_lists_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileRunStore::open(dir.path()).unwrap();

    let def = chain("wf", &["A"]);
    let later = WorkflowRun::new(&def, at("2024-01-02T00:00:00Z"), at("2024-01-02T00:00:00Z"));
    let earlier = WorkflowRun::new(&def, at("2024-01-01T00:00:00Z"), at("2024-01-01T00:00:00Z"));
    let other = WorkflowRun::new(&chain("other", &["X"]), at("2024-01-01T00:00:00Z"), at("2024-01-01T00:00:00Z"));
    store.save(&later).unwrap();
    store.save(&earlier).unwrap();
    store.save(&other).unwrap();

    assert_eq!(store.get(&earlier.key).unwrap(), Some(earlier.clone()));
    assert_eq!(store.get(&RunKey::new("wf", at("2030-01-01T00:00:00Z"))).unwrap(), None);

    let keys: Vec<_> = store.list(Some("wf")).unwrap().into_iter().map(|r| r.key).collect();
    assert_eq!(keys, [earlier.key.clone(), later.key.clone()]);
    assert_eq!(store.list(None).unwrap().len(), 3);
    assert!(store.list(Some("missing")).unwrap().is_empty());

    // A save overwrites the record in place.
    let mut updated = earlier.clone();
    updated.state = WorkflowRunState::Cancelled;
    store.save(&updated).unwrap();
    assert_eq!(store.list(Some("wf")).unwrap().len(), 2);
    assert_eq!(store.get(&earlier.key).unwrap().unwrap().state, WorkflowRunState::Cancelled);
}

#[test]
fn runs_in_the_same_second_keep_separate_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileRunStore::open(dir.path()).unwrap();

    let def = chain("wf", &["A"]);
    let first = WorkflowRun::new(&def, at("2024-01-01T06:00:00Z"), at("2024-01-01T06:00:00Z"));
    let second = WorkflowRun::new(&def, at("2024-01-01T06:00:00.400Z"), at("2024-01-01T06:00:00.400Z"));
    store.save(&first).unwrap();
    store.save(&second).unwrap();

    let keys: Vec<_> = store.list(Some("wf")).unwrap().into_iter().map(|r| r.key).collect();
    assert_eq!(keys, [first.key.clone(), second.key.clone()]);
    assert_eq!(store.get(&first.key).unwrap().map(|r| r.key), Some(first.key.clone()));
    assert_eq!(store.get(&second.key).unwrap().map(|r| r.key), Some(second.key));
}

#[test]
fn get_ignores_a_record_with_another_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileRunStore::open(dir.path()).unwrap();

    let def = chain("wf", &["A"]);
    let stored = WorkflowRun::new(&def, at("2024-01-01T06:00:00Z"), at("2024-01-01T06:00:00Z"));
    store.save(&stored).unwrap();

    // Move the record under the file name of another instant.
    let wf_dir = dir.path().join("runs").join("wf");
    let original = wf_dir.join("20240101T060000.000000000Z.json");
    assert!(original.exists());
    fs::rename(&original, wf_dir.join("20240102T060000.000000000Z.json")).unwrap();

    let other = RunKey::new("wf", at("2024-01-02T06:00:00Z"));
    assert_eq!(store.get(&other).unwrap(), None);
}

#[test]
fn unreadable_records_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileRunStore::open(dir.path()).unwrap();
    store.save(&interrupted_run()).unwrap();

    fs::write(dir.path().join("runs").join("wf").join("garbage.json"), "{ not json").unwrap();

    let runs = store.list(Some("wf")).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].key, RunKey::new("wf", manual_instant()));
}

#[test]
fn status_reports_each_task() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileRunStore::open(dir.path()).unwrap();
    store.save(&interrupted_run()).unwrap();

    let status = get_run_status(&store, "wf", manual_instant())
        .unwrap()
        .expect("status for stored run");
    assert_eq!(status.state, WorkflowRunState::Running);
    let states: Vec<_> = status.tasks.iter().map(|t| (t.task.as_str(), t.state)).collect();
    assert_eq!(
        states,
        [
            ("A", TaskRunState::Succeeded),
            ("B", TaskRunState::Running),
            ("C", TaskRunState::Blocked),
        ]
    );

    assert!(get_run_status(&store, "wf", at("2030-01-01T00:00:00Z")).unwrap().is_none());

    let report = format_statuses("wf", &list_run_statuses(&store, "wf").unwrap());
    assert!(report.contains("2024-01-01T06:00:00Z"));
    assert!(report.contains("- B: Running"));

    let empty = format_statuses("nope", &list_run_statuses(&store, "nope").unwrap());
    assert!(empty.contains("no runs recorded"));
}

#[tokio::test]
async fn restart_resumes_interrupted_run() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn RunStore> = Arc::new(FileRunStore::open(dir.path()).unwrap());
    store.save(&interrupted_run()).unwrap();

    let mut harness = Harness::start_with_store(
        vec![chain("wf", &["A", "B", "C"])],
        ScriptedExecutor::new(),
        store.clone(),
        manual_options(),
    );
    with_timeout(harness.wait()).await.unwrap();

    // A is not run again; B restarts at the same attempt.
    assert_eq!(harness.executor.executed(), ["B", "C"]);
    assert_eq!(harness.executor.invocations_of("B")[0].attempt, 0);

    let run = store
        .get(&RunKey::new("wf", manual_instant()))
        .unwrap()
        .unwrap();
    assert_eq!(run.state, WorkflowRunState::Succeeded);
}

#[tokio::test]
async fn finished_runs_are_not_resumed() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn RunStore> = Arc::new(FileRunStore::open(dir.path()).unwrap());

    let mut done = interrupted_run();
    done.state = WorkflowRunState::Succeeded;
    store.save(&done).unwrap();

    let mut harness = Harness::start_with_store(
        vec![chain("wf", &["A", "B", "C"])],
        ScriptedExecutor::new(),
        store,
        manual_options(),
    );
    // The stored run blocks a manual request for the same instant.
    harness.handle.trigger("wf", manual_instant()).await.unwrap();
    with_timeout(harness.wait()).await.unwrap();

    assert!(harness.executor.executed().is_empty());
}
