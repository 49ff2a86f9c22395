// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Cron-expression parsing and epoch-minute firing evaluation, shared by
//! the Scheduler (§4.7) and SleepManager (§4.10).

use chrono::{DateTime, TimeZone, Utc};
use cron::Schedule;
use std::str::FromStr;

/// Parse a 5-field (`min hour dom month dow`) or 6-field (`sec min hour
/// dom month dow`) cron expression. The `cron` crate requires a seconds
/// field; 5-field expressions are the common case (§6 example
/// `"*/1 * * * *"`) and are widened with a leading `0` seconds column.
pub fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    let field_count = expr.split_whitespace().count();
    let normalized = if field_count == 5 { format!("0 {expr}") } else { expr.to_string() };
    Schedule::from_str(&normalized)
}

/// True if `schedule` has an occurrence exactly at the start of
/// `epoch_minute` (`floor(unix-time-seconds / 60)`, §GLOSSARY). A per-tick
/// cache of parsed schedules (kept by callers) makes this cheap to call
/// once per mind per tick.
pub fn fires_at_epoch_minute(schedule: &Schedule, epoch_minute: u64) -> bool {
    let minute_start = epoch_minute as i64 * 60;
    let Some(at) = Utc.timestamp_opt(minute_start, 0).single() else { return false };
    let just_before = at - chrono::Duration::seconds(1);
    matches!(schedule.after(&just_before).next(), Some(next) if next == at)
}

pub fn epoch_minute_for(at: DateTime<Utc>) -> u64 {
    (at.timestamp() / 60).max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_minute_fires_every_epoch_minute() {
        let schedule = parse_cron("*/1 * * * *").unwrap();
        assert!(fires_at_epoch_minute(&schedule, 1_000_000));
        assert!(fires_at_epoch_minute(&schedule, 1_000_001));
    }

    #[test]
    fn hourly_schedule_fires_only_at_the_hour() {
        let schedule = parse_cron("0 * * * *").unwrap();
        let on_hour = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let off_hour = Utc.with_ymd_and_hms(2026, 1, 1, 12, 30, 0).unwrap();
        assert!(fires_at_epoch_minute(&schedule, epoch_minute_for(on_hour)));
        assert!(!fires_at_epoch_minute(&schedule, epoch_minute_for(off_hour)));
    }

    #[test]
    fn six_field_expressions_pass_through_unchanged() {
        let schedule = parse_cron("0 0 * * * *").unwrap();
        let on_hour = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert!(fires_at_epoch_minute(&schedule, epoch_minute_for(on_hour)));
    }
}
