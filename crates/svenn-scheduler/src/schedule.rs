//! Five-field cron expressions evaluated in UTC.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::{Result, SchedulerError};

/// A validated `minute hour day-of-month month day-of-week` expression.
#[derive(Debug, Clone)]
pub struct CronExpr {
    expression: String,
    schedule: Schedule,
}

impl CronExpr {
    /// Accepts exactly five whitespace-separated fields. The `cron` crate
    /// wants seconds first and an optional year, so `0 … *` is wrapped
    /// around the fields before parsing.
    ///
    /// Day-of-week numbers use crontab numbering (`0` and `7` are Sunday,
    /// `1` is Monday) and are renumbered for the `cron` crate, which counts
    /// Sunday as `1`. Day names pass through unchanged.
    pub fn parse(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(SchedulerError::InvalidCron {
                expression: expression.to_string(),
                reason: format!("expected 5 fields, got {}", fields.len()),
            });
        }
        let normalized = fields.join(" ");
        let evaluated = format!(
            "0 {} {} {} {} {} *",
            fields[0],
            fields[1],
            fields[2],
            fields[3],
            crate_day_of_week(fields[4])
        );
        let schedule = Schedule::from_str(&evaluated).map_err(|e| {
            SchedulerError::InvalidCron {
                expression: expression.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            expression: normalized,
            schedule,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

/// Rewrite a crontab day-of-week field in the `cron` crate's numbering.
fn crate_day_of_week(field: &str) -> String {
    if field == "*" || field == "?" {
        return field.to_string();
    }
    field
        .split(',')
        .map(|item| match crontab_days(item) {
            Some(days) => {
                let mut ordinals: Vec<u32> = days.into_iter().map(|d| d % 7 + 1).collect();
                ordinals.sort_unstable();
                ordinals.dedup();
                ordinals
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            }
            // Names and anything malformed go to the crate as written.
            None => item.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Expand one numeric list item (`n`, `a-b`, `*/s`, `a-b/s`, `n/s`) into
/// crontab day numbers. `None` unless every part is a number in `0..=7`.
fn crontab_days(item: &str) -> Option<Vec<u32>> {
    let (base, step) = match item.split_once('/') {
        Some((base, step)) => (base, step.parse::<usize>().ok().filter(|s| *s > 0)?),
        None => (item, 1),
    };
    let (start, end) = match base.split_once('-') {
        _ if base == "*" => (0, 7),
        Some((a, b)) => (a.parse::<u32>().ok()?, b.parse::<u32>().ok()?),
        None => {
            let day = base.parse::<u32>().ok()?;
            (day, if step > 1 { 7 } else { day })
        }
    };
    if start > end || end > 7 {
        return None;
    }
    Some((start..=end).step_by(step).collect())
}

impl std::fmt::Display for CronExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expression)
    }
}
