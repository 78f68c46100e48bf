// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `crondag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "crondag",
    version,
    about = "Run task graphs on cron schedules with retries and dependencies.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Crondag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Crondag.toml")]
    pub config: String,

    /// Evaluate schedules once, run every due run to completion, then exit.
    #[arg(long)]
    pub once: bool,

    /// Queue a manual run of this workflow at the current instant.
    #[arg(long, value_name = "WORKFLOW")]
    pub trigger: Option<String>,

    /// Print the stored runs of this workflow and exit.
    #[arg(long, value_name = "WORKFLOW", conflicts_with_all = ["trigger", "dry_run"])]
    pub status: Option<String>,

    /// Fail at startup if any workflow definition is rejected.
    #[arg(long)]
    pub strict: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CRONDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print workflows and next run times, but don't
    /// execute any commands.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
