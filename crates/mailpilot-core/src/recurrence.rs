//! Next-run computation for recurring mail schedules
//!
//! A schedule is a set of weekdays (0-6, Sunday = 0), a wall-clock time of
//! day, and an IANA timezone. The next matching instant is found with a
//! minute-granularity forward scan, delegating all calendar math to the
//! timezone-aware conversion so DST transitions and odd offsets are handled
//! for free.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use chrono_tz::Tz;
use mailpilot_common::types::TimeOfDay;
use mailpilot_common::{Error, Result};
use tracing::warn;

/// Scan horizon: 8 days of candidate minutes
const SCAN_MINUTES: i64 = 8 * 24 * 60;

/// Degraded-but-safe deferral applied when no slot can be found
const FALLBACK_MINUTES: i64 = 5;

/// Compute the next instant matching the schedule, strictly after `from`.
///
/// The scan starts at `from + 1 minute` so repeated invocations at the same
/// moment always make forward progress. Malformed input (unknown timezone,
/// unparseable time, empty weekday set) falls back to `from + 5 minutes`
/// rather than stalling the schedule forever.
pub fn next_run_at(
    from: DateTime<Utc>,
    days_of_week: &[u32],
    send_time: &str,
    timezone: &str,
) -> DateTime<Utc> {
    let tz: Tz = match timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(timezone, "unknown timezone, deferring next run");
            return from + Duration::minutes(FALLBACK_MINUTES);
        }
    };

    let Some(time) = TimeOfDay::parse(send_time) else {
        warn!(send_time, "unparseable send time, deferring next run");
        return from + Duration::minutes(FALLBACK_MINUTES);
    };

    let start = truncate_to_minute(from + Duration::minutes(1));
    for offset in 0..SCAN_MINUTES {
        let candidate = start + Duration::minutes(offset);
        let local = candidate.with_timezone(&tz);
        if days_of_week.contains(&local.weekday().num_days_from_sunday())
            && local.hour() == time.hour
            && local.minute() == time.minute
        {
            return candidate;
        }
    }

    warn!(
        ?days_of_week,
        send_time, timezone, "no matching slot within the scan window, deferring next run"
    );
    from + Duration::minutes(FALLBACK_MINUTES)
}

/// Validate schedule fields before anything is persisted.
///
/// The calculator above tolerates malformed schedules with a fallback, but
/// user input is rejected here instead of being silently degraded.
pub fn validate_schedule(days_of_week: &[u32], send_time: &str, timezone: &str) -> Result<TimeOfDay> {
    if days_of_week.is_empty() {
        return Err(Error::Validation(
            "At least one weekday is required".to_string(),
        ));
    }

    if let Some(day) = days_of_week.iter().find(|d| **d > 6) {
        return Err(Error::Validation(format!(
            "Invalid weekday: {} (expected 0-6, Sunday = 0)",
            day
        )));
    }

    let time = TimeOfDay::parse(send_time).ok_or_else(|| {
        Error::Validation(format!("Invalid send time: {} (expected HH:MM)", send_time))
    })?;

    if timezone.parse::<Tz>().is_err() {
        return Err(Error::Validation(format!("Unknown timezone: {}", timezone)));
    }

    Ok(time)
}

fn truncate_to_minute(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .with_second(0)
        .and_then(|dt| dt.with_nanosecond(0))
        .unwrap_or(instant)
}
