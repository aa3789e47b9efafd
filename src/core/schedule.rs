//! Interval arithmetic for job recurrence.

use chrono::{DateTime, Duration, Utc};

use super::models::IntervalUnit;

pub fn interval(value: u32, unit: IntervalUnit) -> Duration {
    let value = i64::from(value.max(1));
    match unit {
        IntervalUnit::Minutes => Duration::minutes(value),
        IntervalUnit::Hours => Duration::hours(value),
        IntervalUnit::Days => Duration::days(value),
    }
}

/// Longest accepted job interval.
pub const MAX_INTERVAL_DAYS: i64 = 3650;

/// Smallest `anchor + k * step` (k >= 1) strictly after `now`.
///
/// Computed arithmetically so a daemon that was offline for months does not
/// loop once per missed interval. A result past the representable range
/// saturates to the maximum timestamp, so the job never becomes due.
pub fn advance_past(anchor: DateTime<Utc>, step: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(first) = anchor.checked_add_signed(step) else {
        return DateTime::<Utc>::MAX_UTC;
    };
    if first > now {
        return first;
    }

    let step_ms = step.num_milliseconds().max(1);
    let behind_ms = (now - first).num_milliseconds();
    let skipped = behind_ms / step_ms + 1;
    skipped
        .checked_mul(step_ms)
        .and_then(Duration::try_milliseconds)
        .and_then(|ahead| first.checked_add_signed(ahead))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
