//! Sleep between rounds.

use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};

use crate::models::{CheckConfig, SchedulePolicy};

/// How long to wait before the next round, given the current time.
///
/// `Aligned` subtracts the elapsed seconds of the current minute so rounds
/// start near the top of a minute.
pub fn next_delay(check: &CheckConfig, now: DateTime<Utc>) -> Duration {
    match check.policy {
        SchedulePolicy::Fixed => Duration::from_secs(check.interval_secs),
        SchedulePolicy::Aligned => {
            Duration::from_secs(check.interval_secs.saturating_sub(u64::from(now.second())))
        }
    }
}
