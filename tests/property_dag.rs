// tests/property_dag.rs

use std::collections::{BTreeSet, HashSet};

use proptest::prelude::*;

use crondag::dag::{TaskSpec, WorkflowBuilder, WorkflowDefinition, WorkflowRun};
use crondag::engine::TaskOutcome;
use crondag::types::{TaskRunState, WorkflowRunState};
use crondag_test_utils::builders::{at, manual_instant};

// Task N may only depend on tasks 0..N, which keeps every generated graph
// acyclic.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = WorkflowDefinition> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..3), num_tasks)
            .prop_map(|raw_deps| {
                let mut builder = WorkflowBuilder::new("prop");
                for (i, picks) in raw_deps.into_iter().enumerate() {
                    let mut spec = TaskSpec::new(format!("t{i}"), format!("echo t{i}"));
                    if i > 0 {
                        let deps: BTreeSet<usize> = picks.into_iter().map(|d| d % i).collect();
                        for dep in deps {
                            spec = spec.after(format!("t{dep}"));
                        }
                    }
                    builder = builder.task(spec);
                }
                builder.build().expect("generated graph is acyclic")
            })
    })
}

proptest! {
    #[test]
    fn every_task_runs_at_most_once_and_the_run_terminates(
        def in dag_strategy(12),
        failing in proptest::collection::hash_set(0..12usize, 0..3),
        picks in proptest::collection::vec(any::<usize>(), 0..64),
    ) {
        let now = at("2024-01-01T06:00:05Z");
        let failing: HashSet<String> = failing.into_iter().map(|i| format!("t{i}")).collect();

        let mut run = WorkflowRun::new(&def, manual_instant(), now);
        let mut running: Vec<String> = run
            .start(&def, now)
            .newly_scheduled
            .into_iter()
            .map(|t| t.task)
            .collect();
        let mut dispatched: Vec<String> = running.clone();
        let mut picks = picks.into_iter();

        while !running.is_empty() {
            // Complete in-flight tasks in an arbitrary order.
            let idx = picks.next().unwrap_or(0) % running.len();
            let task = running.remove(idx);
            let outcome = if failing.contains(&task) {
                TaskOutcome::failed("scripted failure")
            } else {
                TaskOutcome::success()
            };

            let step = run.apply_outcome(&def, &task, 0, outcome, now);
            prop_assert!(!step.ignored);
            for next in step.newly_scheduled {
                for dep in def.graph().dependencies_of(&next.task) {
                    prop_assert_eq!(run.task(dep).map(|t| t.state), Some(TaskRunState::Succeeded));
                }
                dispatched.push(next.task.clone());
                running.push(next.task);
            }
        }

        let unique: HashSet<&String> = dispatched.iter().collect();
        prop_assert_eq!(unique.len(), dispatched.len());

        prop_assert!(run.is_terminal());
        prop_assert!(run.tasks.values().all(|t| t.state.is_terminal()));

        let any_failed = dispatched.iter().any(|t| failing.contains(t));
        if any_failed {
            prop_assert_eq!(run.state, WorkflowRunState::Failed);
        } else {
            prop_assert_eq!(run.state, WorkflowRunState::Succeeded);
            prop_assert_eq!(dispatched.len(), def.tasks().len());
        }
    }
}
