// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron-driven events, evaluated in UTC.
//!
//! Expressions use the standard 5-field form (minute hour day month
//! weekday, Sunday = 0 or 7); a leading seconds field is also accepted.
//! As in cron, a restricted day-of-month and day-of-week match either.
//! Firings missed while the enqueuer was stopped or late are skipped.

use crate::context::EnqueuerContext;
use crate::error::EnqueuerError;
use crate::lifecycle::{sleep_or_stop, StopSignal, TaskSlot};
use crate::options::{invalid, parse_options};
use chrono::{DateTime, SecondsFormat, Utc};
use hz_core::{FunctionDef, TriggerConfig, TriggerId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleOptions {
    pub cron: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Parsed cron expression.
///
/// When both day-of-month and day-of-week are restricted, a day matches
/// if either field does, so the expression is held as two schedules and
/// their firings are merged.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    primary: cron::Schedule,
    by_weekday: Option<cron::Schedule>,
}

impl CronSchedule {
    /// Firings strictly after `after`, in order.
    pub fn after(&self, after: &DateTime<Utc>) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        let mut primary = self.primary.after(after).peekable();
        let mut by_weekday = self.by_weekday.as_ref().map(|s| s.after(after).peekable());
        std::iter::from_fn(move || {
            let Some(by_weekday) = by_weekday.as_mut() else {
                return primary.next();
            };
            match (primary.peek().copied(), by_weekday.peek().copied()) {
                (Some(a), Some(b)) if a < b => primary.next(),
                (Some(a), Some(b)) if b < a => by_weekday.next(),
                (Some(_), Some(_)) => {
                    by_weekday.next();
                    primary.next()
                }
                (Some(_), None) => primary.next(),
                (None, _) => by_weekday.next(),
            }
        })
    }
}

/// Parse a 5- or 6-field expression into a schedule.
pub fn parse_cron(expr: &str) -> Result<CronSchedule, String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let (seconds, rest) = match fields.len() {
        5 => ("0", &fields[..]),
        6 => (fields[0], &fields[1..]),
        n => return Err(format!("expected 5 or 6 fields, got {n}")),
    };
    let &[minute, hour, day, month, weekday] = rest else {
        return Err(format!("expected 5 or 6 fields, got {}", fields.len()));
    };
    let weekday = weekday_field(weekday)?;
    let build = |day: &str, weekday: &str| {
        cron::Schedule::from_str(&format!("{seconds} {minute} {hour} {day} {month} {weekday}"))
            .map_err(|e| e.to_string())
    };
    if is_restricted(day) && is_restricted(&weekday) {
        Ok(CronSchedule { primary: build(day, "*")?, by_weekday: Some(build("*", &weekday)?) })
    } else {
        Ok(CronSchedule { primary: build(day, &weekday)?, by_weekday: None })
    }
}

/// A field starting with `*` or `?` leaves the day unrestricted.
fn is_restricted(field: &str) -> bool {
    !(field.starts_with('*') || field.starts_with('?'))
}

/// Rewrite numeric weekdays from cron's Sunday = 0 to the parser's
/// Sunday = 1. Numeric ranges are expanded to day lists so a range
/// ending on Sunday (7) keeps it. Names and wildcards pass through.
fn weekday_field(field: &str) -> Result<String, String> {
    let mut parts = Vec::new();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (part, None),
        };
        let bounds = match range.split_once('-') {
            Some((start, end)) => weekday_number(start)?.zip(weekday_number(end)?),
            None => None,
        };
        if let Some((start, end)) = bounds {
            if start > end {
                return Err(format!("weekday range {range} runs backwards"));
            }
            let step = match step {
                Some(step) => step
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("invalid weekday step {step:?}"))?,
                None => 1,
            };
            let mut days: Vec<u8> = (start..=end).step_by(step).map(|day| day % 7 + 1).collect();
            days.sort_unstable();
            days.dedup();
            parts.extend(days.iter().map(u8::to_string));
            continue;
        }
        let shifted = if range == "*" || range == "?" {
            range.to_string()
        } else {
            match weekday_number(range)? {
                Some(day) => (day % 7 + 1).to_string(),
                None => range.to_string(),
            }
        };
        match step {
            Some(step) => parts.push(format!("{shifted}/{step}")),
            None => parts.push(shifted),
        }
    }
    Ok(parts.join(","))
}

fn weekday_number(token: &str) -> Result<Option<u8>, String> {
    if !token.chars().all(|c| c.is_ascii_digit()) || token.is_empty() {
        return Ok(None);
    }
    match token.parse::<u8>() {
        Ok(day) if day <= 7 => Ok(Some(day)),
        _ => Err(format!("weekday {token} out of range 0-7")),
    }
}

impl ScheduleOptions {
    fn validate(&self, trigger: &TriggerConfig) -> Result<CronSchedule, EnqueuerError> {
        if !matches!(self.timezone.as_str(), "UTC" | "utc" | "Etc/UTC") {
            return Err(invalid(
                trigger,
                format!("timezone {:?} is not supported; schedules run in UTC", self.timezone),
            ));
        }
        parse_cron(&self.cron).map_err(|reason| invalid(trigger, format!("cron {:?}: {reason}", self.cron)))
    }
}

struct ScheduleInner {
    function: Arc<FunctionDef>,
    trigger: TriggerConfig,
    schedule: CronSchedule,
    ctx: EnqueuerContext,
}

impl ScheduleInner {
    async fn run(self: Arc<Self>, mut signal: StopSignal) {
        let mut cursor = Utc::now();
        loop {
            let Some(next) = self.schedule.after(&cursor).next() else {
                tracing::info!(function_id = %self.function.id, "schedule has no further firings");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            if sleep_or_stop(wait, &mut signal).await {
                return;
            }
            let fired_at = Utc::now();
            let payload = serde_json::json!({
                "scheduled_at": next.to_rfc3339_opts(SecondsFormat::Secs, true),
                "fired_at": fired_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            });
            if let Some(event_id) = self.ctx.emit(&self.function, &self.trigger, payload) {
                tracing::debug!(function_id = %self.function.id, %event_id, scheduled_at = %next, "schedule fired");
            }
            cursor = next.max(fired_at);
        }
    }
}

/// Enqueuer for one schedule trigger
pub struct ScheduleEnqueuer {
    inner: Arc<ScheduleInner>,
    task: TaskSlot,
}

impl ScheduleEnqueuer {
    pub fn register(
        function: Arc<FunctionDef>,
        trigger: &TriggerConfig,
        ctx: &EnqueuerContext,
    ) -> Result<Self, EnqueuerError> {
        let options = parse_options::<ScheduleOptions>(trigger)?;
        let schedule = options.validate(trigger)?;
        Ok(Self {
            inner: Arc::new(ScheduleInner {
                function,
                trigger: trigger.clone(),
                schedule,
                ctx: ctx.clone(),
            }),
            task: TaskSlot::default(),
        })
    }

    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        self.task.start(move |signal| inner.run(signal));
    }

    pub async fn stop(&self) {
        self.task.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn trigger_id(&self) -> &TriggerId {
        &self.inner.trigger.id
    }

    /// First firing strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.inner.schedule.after(&after).next()
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
