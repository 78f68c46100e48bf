// src/schedule/mod.rs

//! Time-based scheduling.
//!
//! - [`cron_expr`] parses and evaluates cron expressions.
//! - [`scheduler`] turns loaded workflow definitions into due run keys,
//!   honouring catchup and idempotence.

pub mod cron_expr;
pub mod scheduler;

pub use cron_expr::CronSchedule;
pub use scheduler::{Scheduler, due_instants, next_run_after};
