//! Time utility functions

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

/// Fixed fractional-second resolution of trace timestamps (milliseconds)
pub const FRACTION_DIGITS: usize = 3;

/// Normalize a fractional-second digit string to milliseconds.
///
/// Capture tools write anywhere from one to six fractional digits. The value is
/// truncated or right-padded with zeros to exactly three digits, so `"5"` is
/// 500 ms and `"123456"` is 123 ms. A missing fraction is 0 ms.
pub fn normalize_millis(fraction: Option<&str>) -> Option<u32> {
    let digits = fraction.unwrap_or("");
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut millis = 0u32;
    for i in 0..FRACTION_DIGITS {
        let digit = digits.as_bytes().get(i).map_or(0, |b| u32::from(b - b'0'));
        millis = millis * 10 + digit;
    }
    Some(millis)
}

/// Parse `HH:MM:SS` plus an optional fractional part into a time of day.
pub fn parse_time_of_day(hms: &str, fraction: Option<&str>) -> Option<NaiveTime> {
    let base = NaiveTime::parse_from_str(hms, "%H:%M:%S").ok()?;
    let millis = normalize_millis(fraction)?;
    base.with_nanosecond(millis * 1_000_000)
}

/// Parse a `YYYY-MM-DD` date, falling back to `base` when absent.
pub fn parse_date_or(date: Option<&str>, base: NaiveDate) -> Option<NaiveDate> {
    match date {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d").ok(),
        None => Some(base),
    }
}

/// Combine an optional date and a time-of-day into one timestamp.
pub fn parse_trace_timestamp(
    date: Option<&str>,
    hms: &str,
    fraction: Option<&str>,
    base: NaiveDate,
) -> Option<NaiveDateTime> {
    let day = parse_date_or(date, base)?;
    let time = parse_time_of_day(hms, fraction)?;
    Some(day.and_time(time))
}

/// Duration in fractional milliseconds, for display only.
pub fn delta_millis(delta: TimeDelta) -> f64 {
    delta.num_microseconds().unwrap_or(i64::MAX) as f64 / 1000.0
}

/// Duration in fractional seconds, for display only.
pub fn delta_secs(delta: TimeDelta) -> f64 {
    delta_millis(delta) / 1000.0
}
