// tests/scheduler_catchup.rs

use crondag::errors::CrondagError;
use crondag::registry::WorkflowRegistry;
use crondag::schedule::{CronSchedule, Scheduler, next_run_after};
use crondag::dag::{TaskSpec, WorkflowBuilder};
use crondag::types::RunKey;
use crondag_test_utils::builders::{at, daily};

fn scheduler_for(defs: Vec<crondag::dag::WorkflowDefinition>) -> Scheduler {
    Scheduler::new(WorkflowRegistry::from_definitions(defs))
}

fn instants(keys: &[RunKey]) -> Vec<String> {
    keys.iter()
        .map(|k| k.scheduled_for.format("%Y-%m-%d").to_string())
        .collect()
}

#[test]
fn catchup_materializes_every_missed_instant() {
    let mut scheduler = scheduler_for(vec![daily("wf", at("2024-01-01T00:00:00Z"), true)]);

    let due = scheduler.due_runs(at("2024-01-05T12:00:00Z"));

    assert_eq!(
        instants(&due),
        ["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04", "2024-01-05"]
    );
    assert!(due.iter().all(|k| k.workflow_id == "wf"));
}

#[test]
fn without_catchup_only_the_latest_instant_runs() {
    let mut scheduler = scheduler_for(vec![daily("wf", at("2024-01-01T00:00:00Z"), false)]);

    let due = scheduler.due_runs(at("2024-01-05T12:00:00Z"));
    assert_eq!(instants(&due), ["2024-01-05"]);

    // Skipped instants stay skipped; the next boundary still runs.
    let due = scheduler.due_runs(at("2024-01-06T00:30:00Z"));
    assert_eq!(instants(&due), ["2024-01-06"]);
}

#[test]
fn evaluating_the_same_instant_twice_yields_one_run() {
    for catchup in [true, false] {
        let mut scheduler = scheduler_for(vec![daily("wf", at("2024-01-01T00:00:00Z"), catchup)]);
        let now = at("2024-01-03T00:00:00Z");

        let first = scheduler.due_runs(now);
        let second = scheduler.due_runs(now);

        assert!(!first.is_empty());
        assert!(second.is_empty(), "catchup={catchup}");
    }
}

#[test]
fn instants_before_start_date_never_run() {
    let mut scheduler = scheduler_for(vec![daily("wf", at("2024-02-01T00:00:00Z"), true)]);
    assert!(scheduler.due_runs(at("2024-01-20T00:00:00Z")).is_empty());
    assert_eq!(instants(&scheduler.due_runs(at("2024-02-01T00:00:00Z"))), ["2024-02-01"]);
}

#[test]
fn manual_requests_share_the_idempotence_rule() {
    let mut scheduler = scheduler_for(vec![daily("wf", at("2024-01-01T00:00:00Z"), true)]);
    scheduler.due_runs(at("2024-01-02T12:00:00Z"));

    let existing = scheduler.request_run("wf", at("2024-01-02T00:00:00Z")).unwrap();
    assert!(existing.is_none());

    let adhoc = at("2024-01-02T09:15:00Z");
    let key = scheduler.request_run("wf", adhoc).unwrap();
    assert_eq!(key, Some(RunKey::new("wf", adhoc)));
    assert!(scheduler.request_run("wf", adhoc).unwrap().is_none());

    let err = scheduler.request_run("ghost", adhoc).unwrap_err();
    assert!(matches!(err, CrondagError::WorkflowNotFound(ref id) if id == "ghost"));
}

#[test]
fn seeded_runs_are_not_created_again() {
    let mut scheduler = scheduler_for(vec![daily("wf", at("2024-01-01T00:00:00Z"), true)]);
    scheduler.seed([
        RunKey::new("wf", at("2024-01-01T00:00:00Z")),
        RunKey::new("wf", at("2024-01-02T00:00:00Z")),
    ]);

    let due = scheduler.due_runs(at("2024-01-03T00:00:00Z"));
    assert_eq!(instants(&due), ["2024-01-03"]);
}

fn every_minute(catchup: bool) -> crondag::dag::WorkflowDefinition {
    WorkflowBuilder::new("wf")
        .schedule("* * * * *")
        .start_date(at("2024-01-01T00:00:00Z"))
        .catchup(catchup)
        .task(TaskSpec::new("A", "echo A"))
        .build()
        .unwrap()
}

#[test]
fn settled_instants_are_not_kept_in_memory() {
    let mut scheduler = scheduler_for(vec![every_minute(true)]);

    let mut total = 0;
    let mut now = at("2024-01-01T00:00:00Z");
    for _ in 0..24 {
        now += chrono::Duration::hours(1);
        total += scheduler.due_runs(now).len();
    }
    assert_eq!(total, 24 * 60 + 1);
    assert_eq!(scheduler.retained("wf"), 0);

    // Pruned instants still count as materialized.
    let old = RunKey::new("wf", at("2024-01-01T03:17:00Z"));
    assert!(scheduler.is_materialized(&old));
    assert!(scheduler.request_run("wf", old.scheduled_for).unwrap().is_none());
    assert!(scheduler.due_runs(now).is_empty());

    // Off-schedule manual runs are kept and stay idempotent.
    let adhoc = at("2024-01-01T03:17:30Z");
    assert!(scheduler.request_run("wf", adhoc).unwrap().is_some());
    now += chrono::Duration::hours(1);
    scheduler.due_runs(now);
    assert_eq!(scheduler.retained("wf"), 1);
    assert!(scheduler.request_run("wf", adhoc).unwrap().is_none());
}

#[test]
fn seeded_history_is_pruned_after_the_first_tick() {
    let mut scheduler = scheduler_for(vec![every_minute(true)]);
    let seeded: Vec<_> = (0..600)
        .map(|m| RunKey::new("wf", at("2024-01-01T00:00:00Z") + chrono::Duration::minutes(m)))
        .collect();
    scheduler.seed(seeded.clone());
    assert_eq!(scheduler.retained("wf"), 600);

    let due = scheduler.due_runs(at("2024-01-01T10:05:00Z"));
    assert_eq!(instants(&due).len(), 6);
    assert_eq!(scheduler.retained("wf"), 0);
    assert!(seeded.iter().all(|k| scheduler.is_materialized(k)));
}

#[test]
fn skipped_instants_without_catchup_stay_skipped() {
    let mut scheduler = scheduler_for(vec![every_minute(false)]);

    let due = scheduler.due_runs(at("2024-01-01T12:00:00Z"));
    assert_eq!(due, [RunKey::new("wf", at("2024-01-01T12:00:00Z"))]);

    let skipped = at("2024-01-01T08:00:00Z");
    assert!(scheduler.is_materialized(&RunKey::new("wf", skipped)));
    assert!(scheduler.request_run("wf", skipped).unwrap().is_none());

    // Future instants are still open.
    let ahead = at("2024-01-01T13:00:00Z");
    assert!(scheduler.request_run("wf", ahead).unwrap().is_some());
}

#[test]
fn manual_only_and_unloaded_workflows_are_never_due() {
    let manual = WorkflowBuilder::new("manual")
        .task(TaskSpec::new("A", "echo A"))
        .build()
        .unwrap();
    let mut scheduler = scheduler_for(vec![
        manual,
        daily("wf", at("2024-01-01T00:00:00Z"), true),
    ]);
    scheduler.unload("wf");

    assert!(scheduler.due_runs(at("2024-03-01T00:00:00Z")).is_empty());
    assert!(scheduler.registry().contains("manual"));
    assert!(!scheduler.registry().contains("wf"));
}

#[test]
fn reload_replaces_the_definition_set() {
    let mut scheduler = scheduler_for(vec![daily("old", at("2024-01-01T00:00:00Z"), false)]);
    scheduler.reload(vec![daily("new", at("2024-01-01T00:00:00Z"), false)]);

    let due = scheduler.due_runs(at("2024-01-02T00:00:00Z"));
    assert_eq!(due, [RunKey::new("new", at("2024-01-02T00:00:00Z"))]);
}

#[test]
fn five_field_cron_uses_standard_weekdays() {
    // 2024-01-01 is a Monday.
    let mondays = CronSchedule::parse("30 6 * * 1").unwrap();
    assert_eq!(
        mondays.next_after(at("2024-01-01T00:00:00Z")),
        Some(at("2024-01-01T06:30:00Z"))
    );

    let sundays = CronSchedule::parse("0 0 * * 0").unwrap();
    assert_eq!(
        sundays.next_after(at("2024-01-01T00:00:00Z")),
        Some(at("2024-01-07T00:00:00Z"))
    );

    let weekdays = CronSchedule::parse("0 9 * * 1-5").unwrap();
    let week = weekdays.instants_between(at("2024-01-01T00:00:00Z"), at("2024-01-07T23:59:59Z"));
    assert_eq!(week.len(), 5);
}

#[test]
fn presets_and_seconds_fields_parse() {
    let hourly = CronSchedule::parse("@hourly").unwrap();
    assert_eq!(
        hourly.next_after(at("2024-01-01T10:15:00Z")),
        Some(at("2024-01-01T11:00:00Z"))
    );

    let daily = CronSchedule::parse("@DAILY").unwrap();
    assert_eq!(
        daily.latest_between(at("2024-01-01T00:00:00Z"), at("2024-03-10T08:00:00Z")),
        Some(at("2024-03-10T00:00:00Z"))
    );

    let every_30s = CronSchedule::parse("*/30 * * * * *").unwrap();
    assert_eq!(
        every_30s.next_after(at("2024-01-01T00:00:00Z")),
        Some(at("2024-01-01T00:00:30Z"))
    );

    assert!(CronSchedule::parse("* * *").is_err());
    assert!(CronSchedule::parse("0 0 * * 9").is_err());
}

#[test]
fn next_run_respects_start_date() {
    let def = daily("wf", at("2024-06-01T00:00:00Z"), false);
    assert_eq!(
        next_run_after(&def, at("2024-01-01T00:00:00Z")),
        Some(at("2024-06-01T00:00:00Z"))
    );
    assert_eq!(
        next_run_after(&def, at("2024-06-01T00:00:00Z")),
        Some(at("2024-06-02T00:00:00Z"))
    );
}
