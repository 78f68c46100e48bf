#![allow(dead_code)]

use chrono::{DateTime, Utc};
use crondag::dag::{TaskSpec, WorkflowBuilder, WorkflowDefinition};
use crondag::engine::RuntimeOptions;

/// Parse an RFC 3339 timestamp, panicking on bad input.
pub fn at(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .expect("valid RFC 3339 timestamp")
        .with_timezone(&Utc)
}

/// Logical instant used by tests that trigger runs by hand.
pub fn manual_instant() -> DateTime<Utc> {
    at("2024-01-01T06:00:00Z")
}

/// Options for tests that drive the runtime with explicit events only and
/// want it to stop once every run finished.
pub fn manual_options() -> RuntimeOptions {
    RuntimeOptions {
        exit_when_idle: true,
        tick_interval: None,
    }
}

/// Linear chain `names[0] -> names[1] -> ...`, each task running `echo <name>`.
pub fn chain_builder(id: &str, names: &[&str]) -> WorkflowBuilder {
    let mut builder = WorkflowBuilder::new(id);
    for name in names {
        builder = builder.task(TaskSpec::new(*name, format!("echo {name}")));
    }
    builder.chain(names)
}

pub fn chain(id: &str, names: &[&str]) -> WorkflowDefinition {
    chain_builder(id, names)
        .build()
        .expect("chain workflow should build")
}

/// `A -> {B, C} -> D`.
pub fn diamond(id: &str) -> WorkflowDefinition {
    WorkflowBuilder::new(id)
        .task(TaskSpec::new("A", "echo A"))
        .task(TaskSpec::new("B", "echo B").after("A"))
        .task(TaskSpec::new("C", "echo C").after("A"))
        .task(TaskSpec::new("D", "echo D").after("B").after("C"))
        .build()
        .expect("diamond workflow should build")
}

/// Single task on a daily midnight schedule.
pub fn daily(id: &str, start: DateTime<Utc>, catchup: bool) -> WorkflowDefinition {
    WorkflowBuilder::new(id)
        .schedule("0 0 * * *")
        .start_date(start)
        .catchup(catchup)
        .task(TaskSpec::new("only", "echo only"))
        .build()
        .expect("daily workflow should build")
}
