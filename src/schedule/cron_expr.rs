// src/schedule/cron_expr.rs

//! Cron expression parsing and evaluation (always in UTC).
//!
//! Accepted forms:
//! - standard 5-field cron: `min hour day-of-month month day-of-week`
//!   (day-of-week `0`/`7` = Sunday),
//! - 6/7-field cron with a leading seconds field (and optional year),
//! - presets: `@hourly`, `@daily`, `@weekly`, `@monthly`, `@yearly`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

/// A parsed schedule expression.
#[derive(Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: Schedule,
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expression).finish()
    }
}

impl CronSchedule {
    /// Parse an expression; the error is a human-readable reason.
    pub fn parse(expression: &str) -> Result<Self, String> {
        let normalized = normalize(expression)?;
        let schedule = Schedule::from_str(&normalized).map_err(|e| e.to_string())?;
        Ok(Self {
            expression: expression.trim().to_string(),
            schedule,
        })
    }

    /// The expression as written by the user.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First instant strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Whether `t` is one of the schedule's instants.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t.timestamp_subsec_nanos() == 0
            && self.next_after(t - chrono::Duration::seconds(1)) == Some(t)
    }

    /// All instants `t` with `from <= t <= until`, oldest first.
    pub fn instants_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        if from > until {
            return Vec::new();
        }
        // `after` is exclusive; step back one second so `from` itself counts.
        let start = from - chrono::Duration::seconds(1);
        self.schedule
            .after(&start)
            .take_while(|t| *t <= until)
            .collect()
    }

    /// Latest instant `t` with `from <= t <= until`, if any.
    pub fn latest_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if from > until {
            return None;
        }
        // Walk backwards from `until` with a growing window so sparse
        // schedules (e.g. yearly) do not force a scan from `from`.
        let mut window = chrono::Duration::days(1);
        loop {
            let lower = std::cmp::max(from, until - window);
            if let Some(latest) = self.instants_between(lower, until).pop() {
                return Some(latest);
            }
            if lower == from {
                return None;
            }
            window = window * 2;
        }
    }
}

/// Rewrite a user expression into the 6/7-field dialect of the `cron` crate.
fn normalize(expression: &str) -> Result<String, String> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err("empty schedule expression".to_string());
    }
    if trimmed.starts_with('@') {
        return Ok(trimmed.to_lowercase());
    }

    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    match fields.len() {
        5 => {
            let dow = standard_day_of_week(fields[4])?;
            Ok(format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], fields[2], fields[3], dow
            ))
        }
        6 | 7 => Ok(fields.join(" ")),
        n => Err(format!(
            "expected 5 fields (min..dow) or 6/7 fields (sec..dow[..year]), got {n}"
        )),
    }
}

/// The `cron` crate numbers days 1-7 starting on Sunday; standard cron uses
/// 0-6 (and 7) starting on Sunday. Numeric days are rewritten to names.
fn standard_day_of_week(field: &str) -> Result<String, String> {
    const NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

    let mut out = String::with_capacity(field.len() + 8);
    let mut digits = String::new();
    // Digits after a '/' are a step, not a day.
    let mut in_step = false;

    for c in field.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        flush_day(&mut digits, &mut out, in_step, &NAMES)?;
        match c {
            '/' => in_step = true,
            ',' => in_step = false,
            _ => {}
        }
        out.push(c);
    }
    flush_day(&mut digits, &mut out, in_step, &NAMES)?;

    Ok(out)
}

fn flush_day(
    digits: &mut String,
    out: &mut String,
    in_step: bool,
    names: &[&str],
) -> Result<(), String> {
    if digits.is_empty() {
        return Ok(());
    }
    if in_step {
        out.push_str(digits);
    } else {
        let day: usize = digits
            .parse()
            .map_err(|_| format!("invalid day-of-week '{digits}'"))?;
        let name = names
            .get(day)
            .ok_or_else(|| format!("day-of-week {day} out of range 0-7"))?;
        out.push_str(name);
    }
    digits.clear();
    Ok(())
}
