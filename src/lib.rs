// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod notify;
pub mod registry;
pub mod schedule;
pub mod status;
pub mod store;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::config::{LoadedConfig, load_definitions};
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions};
use crate::errors::CrondagError;
use crate::exec::{ShellExecutor, WorkerPool};
use crate::notify::{CommandNotifier, LogNotifier, Notifier};
use crate::registry::WorkflowRegistry;
use crate::schedule::{Scheduler, next_run_after};
use crate::store::open_store;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and definition validation
/// - registry / scheduler / core runtime
/// - run store and notifier
/// - worker pool around the shell executor
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let loaded = load_definitions(&config_path)?;
    report_rejections(&loaded, args.strict)?;

    let settings = loaded.settings.clone();

    if let Some(workflow_id) = args.status.as_deref() {
        let store = open_store(settings.store, &settings.state_dir)?;
        let statuses = status::list_run_statuses(store.as_ref(), workflow_id)?;
        print!("{}", status::format_statuses(workflow_id, &statuses));
        return Ok(());
    }

    if args.dry_run {
        print_dry_run(&loaded, Utc::now());
        return Ok(());
    }

    let registry = WorkflowRegistry::from_definitions(loaded.definitions);
    if let Some(workflow_id) = args.trigger.as_deref() {
        if !registry.contains(workflow_id) {
            return Err(CrondagError::WorkflowNotFound(workflow_id.to_string()).into());
        }
    }
    if registry.is_empty() {
        warn!("no workflow definitions loaded; nothing will be scheduled");
    }
    let scheduler = Scheduler::new(registry);

    let store = open_store(settings.store, &settings.state_dir)?;
    let notifier: Arc<dyn Notifier> = match settings.notify_cmd.clone() {
        Some(cmd) => Arc::new(CommandNotifier::new(cmd)),
        None => Arc::new(LogNotifier),
    };

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(256);

    let executor = WorkerPool::new(
        Arc::new(ShellExecutor::new()),
        settings.max_concurrency,
        rt_tx.clone(),
    );

    // Ctrl-C -> graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; shutting down");
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    // Manual run first so `--once` does not see an idle core before it.
    if let Some(workflow_id) = args.trigger.clone() {
        rt_tx
            .send(RuntimeEvent::RunRequested {
                workflow_id,
                scheduled_for: Utc::now(),
            })
            .await?;
    }
    if args.once {
        rt_tx.send(RuntimeEvent::Tick).await?;
    }

    let options = RuntimeOptions {
        exit_when_idle: args.once,
        tick_interval: (!args.once).then_some(settings.tick_interval),
    };

    // Construct the pure core runtime (single source of truth for semantics).
    let core = CoreRuntime::new(scheduler, options);

    // Construct the async IO shell around the core.
    let runtime = Runtime::new(core, rt_rx, &rt_tx, executor, store, notifier);
    runtime.run().await?;
    Ok(())
}

/// Log every rejected definition; with `strict`, any rejection is fatal.
fn report_rejections(loaded: &LoadedConfig, strict: bool) -> Result<()> {
    for err in loaded.rejected.iter() {
        error!(workflow = %err.workflow(), error = %err, "workflow definition rejected");
    }
    if strict && !loaded.is_clean() {
        bail!(
            "{} workflow definition(s) rejected (--strict)",
            loaded.rejected.len()
        );
    }
    Ok(())
}

/// Dry-run output: workflows, schedules, next run times, tasks.
fn print_dry_run(loaded: &LoadedConfig, now: DateTime<Utc>) {
    let settings = &loaded.settings;
    println!("crondag dry-run");
    println!("  config.max_concurrency = {}", settings.max_concurrency);
    println!("  config.tick_interval = {:?}", settings.tick_interval);
    println!("  config.store = {:?} ({})", settings.store, settings.state_dir.display());
    println!();

    println!("workflows ({}):", loaded.definitions.len());
    for def in loaded.definitions.iter() {
        println!("  - {}", def.id);
        if !def.description.is_empty() {
            println!("      description: {}", def.description);
        }
        match def.schedule.as_ref() {
            Some(schedule) => println!("      schedule: {}", schedule.expression()),
            None => println!("      schedule: (manual only)"),
        }
        println!(
            "      start_date: {}",
            def.start_date.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        println!("      catchup: {}", def.catchup);
        println!("      max_active_runs: {}", def.max_active_runs);
        if !def.tags.is_empty() {
            println!("      tags: {:?}", def.tags);
        }

        let mut next = Vec::new();
        let mut cursor = now;
        while next.len() < 3 {
            let Some(t) = next_run_after(def, cursor) else {
                break;
            };
            next.push(t.to_rfc3339_opts(SecondsFormat::Secs, true));
            cursor = t;
        }
        if !next.is_empty() {
            println!("      next runs: {}", next.join(", "));
        }

        println!("      tasks:");
        for task in def.tasks() {
            println!("        - {}", task.id);
            println!("            cmd: {}", task.command);
            if !task.depends_on.is_empty() {
                println!("            after: {:?}", task.depends_on);
            }
            let retry = &task.policy.retry;
            if retry.max_retries > 0 {
                println!(
                    "            retries: {} (delay {:?})",
                    retry.max_retries, retry.retry_delay
                );
            }
            if let Some(timeout) = task.policy.execution_timeout {
                println!("            execution_timeout: {timeout:?}");
            }
        }
    }

    if !loaded.rejected.is_empty() {
        println!();
        println!("rejected ({}):", loaded.rejected.len());
        for err in loaded.rejected.iter() {
            println!("  - {err}");
        }
    }

    debug!("dry-run complete (no execution)");
}
