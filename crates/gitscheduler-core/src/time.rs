//! Human time expressions: `30m`, `2h`, or `YYYY-MM-DD HH:MM` in local time.

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};

use crate::error::{CoreError, Result};

/// Format accepted for absolute timestamps, interpreted in the local zone.
pub const ABSOLUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Resolve `input` to an absolute instant relative to `now`.
///
/// Relative amounts may be negative; the resulting past instant is rejected
/// later by whoever checks that the schedule lies in the future.
pub fn parse_when(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Some(amount) = input.strip_suffix('m') {
        return offset(input, amount, now, Duration::try_minutes);
    }
    if let Some(amount) = input.strip_suffix('h') {
        return offset(input, amount, now, Duration::try_hours);
    }

    let naive = NaiveDateTime::parse_from_str(input, ABSOLUTE_FORMAT)
        .map_err(|_| invalid(input))?;

    // Ambiguous local times (DST fall-back) take the earlier instant; times
    // inside a spring-forward gap do not exist.
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            CoreError::InvalidFormat(format!("'{input}' does not exist in the local time zone"))
        })
}

fn offset(
    input: &str,
    amount: &str,
    now: DateTime<Utc>,
    unit: fn(i64) -> Option<Duration>,
) -> Result<DateTime<Utc>> {
    // Digits with an optional leading '-' only; no inner spaces or '+'.
    if amount.starts_with('+') {
        return Err(invalid(input));
    }
    let n: i64 = amount.parse().map_err(|_| invalid(input))?;
    let delta = unit(n).ok_or_else(|| invalid(input))?;
    now.checked_add_signed(delta).ok_or_else(|| invalid(input))
}

fn invalid(input: &str) -> CoreError {
    CoreError::InvalidFormat(format!(
        "'{input}' is not a time; use '30m', '2h' or 'YYYY-MM-DD HH:MM'"
    ))
}
