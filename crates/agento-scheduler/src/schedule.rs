// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::str::FromStr;

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone, Utc};
use serde_json::Value;

use agento_store::ScheduleType;

use crate::SchedulerError;

/// A parsed trigger, translated from a task's `(schedule_type,
/// schedule_config)` pair.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Fire once at the given instant.
    OneOff(DateTime<Utc>),
    /// Fire every fixed duration.
    Every(Duration),
    /// Fire daily at a wall-clock time (local timezone).
    DailyAt(NaiveTime),
    /// Standard cron expression.
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    /// Translate a task's schedule definition.
    ///
    /// - `one_off`: `run_at` as RFC 3339.
    /// - `interval`: first positive of `every_minutes` / `every_hours` /
    ///   `every_days`; days plus a parseable `at_time` (`HH:MM`) becomes a
    ///   daily-at-time job.
    /// - `cron`: 5-field (standard) or 6-field (with seconds) `expression`.
    pub fn from_config(
        schedule_type: ScheduleType,
        config: &Value,
    ) -> Result<Self, SchedulerError> {
        match schedule_type {
            ScheduleType::OneOff => {
                let run_at = config
                    .get("run_at")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SchedulerError::InvalidSchedule("one_off requires run_at".to_string()))?;
                let at = DateTime::parse_from_rfc3339(run_at)
                    .map_err(|e| SchedulerError::InvalidSchedule(format!("bad run_at: {e}")))?;
                Ok(Schedule::OneOff(at.with_timezone(&Utc)))
            }
            ScheduleType::Interval => {
                let minutes = positive(config, "every_minutes");
                let hours = positive(config, "every_hours");
                let days = positive(config, "every_days");
                if let Some(minutes) = minutes {
                    return Ok(Schedule::Every(Duration::minutes(minutes)));
                }
                if let Some(hours) = hours {
                    return Ok(Schedule::Every(Duration::hours(hours)));
                }
                let Some(days) = days else {
                    return Err(SchedulerError::InvalidSchedule(
                        "interval requires a positive every_minutes, every_hours or every_days"
                            .to_string(),
                    ));
                };
                if let Some(at_time) = config.get("at_time").and_then(Value::as_str) {
                    if let Ok(time) = NaiveTime::parse_from_str(at_time, "%H:%M") {
                        return Ok(Schedule::DailyAt(time));
                    }
                }
                Ok(Schedule::Every(Duration::days(days)))
            }
            ScheduleType::Cron => {
                let expression = config
                    .get("expression")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        SchedulerError::InvalidSchedule("cron requires expression".to_string())
                    })?;
                // The cron crate expects a seconds field; prepend one for
                // standard 5-field expressions.
                let normalized = if expression.split_whitespace().count() == 5 {
                    format!("0 {expression}")
                } else {
                    expression.to_string()
                };
                let schedule = cron::Schedule::from_str(&normalized).map_err(|e| {
                    SchedulerError::InvalidSchedule(format!("bad cron expression: {e}"))
                })?;
                Ok(Schedule::Cron(Box::new(schedule)))
            }
        }
    }

    /// Next fire instant strictly after `after`; `None` when the schedule
    /// is exhausted (a one-off in the past).
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::OneOff(at) => (*at > after).then_some(*at),
            Schedule::Every(duration) => Some(after + *duration),
            Schedule::DailyAt(time) => {
                let local_after = after.with_timezone(&Local);
                let mut date = local_after.date_naive();
                if local_after.time() >= *time {
                    date = date.succ_opt()?;
                }
                let naive = date.and_time(*time);
                match Local.from_local_datetime(&naive) {
                    chrono::LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
                    chrono::LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
                    // DST gap: fall through to the next day.
                    chrono::LocalResult::None => {
                        let next = date.succ_opt()?.and_time(*time);
                        Local
                            .from_local_datetime(&next)
                            .earliest()
                            .map(|dt| dt.with_timezone(&Utc))
                    }
                }
            }
            Schedule::Cron(schedule) => schedule.after(&after).next(),
        }
    }
}

fn positive(config: &Value, key: &str) -> Option<i64> {
    config.get(key).and_then(Value::as_i64).filter(|n| *n > 0)
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
