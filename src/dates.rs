//! Whole-day date helpers shared by the calendar and the selection wizard.
//!
//! Every range comparison in the crate runs on [`NaiveDate`] values, so two
//! timestamps on the same local day always compare equal regardless of the
//! time of day or a DST shift in between.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone};

/// Short display label for a day, e.g. `"10 Oct"`.
///
/// Only used for display and for the human-readable record labels; never
/// compared.
pub fn day_label(date: NaiveDate) -> String {
    date.format("%-d %b").to_string()
}

/// Strip the time of day, keeping the calendar date in the value's own zone.
pub fn normalize_to_midnight<Tz: TimeZone>(time: &DateTime<Tz>) -> NaiveDate {
    time.date_naive()
}

/// Every day from `start` to `end`, both inclusive.
///
/// An `end` before `start` is clamped to `start`, yielding a single day.
pub fn days_in_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let end = end.max(start);
    start.iter_days().take_while(|day| *day <= end).collect()
}

/// Inclusive-inclusive interval intersection test.
pub fn ranges_overlap(
    a_start: NaiveDate,
    a_end: NaiveDate,
    b_start: NaiveDate,
    b_end: NaiveDate,
) -> bool {
    a_start <= b_end && a_end >= b_start
}

/// Number of days covered by an inclusive range (at least 1).
pub fn inclusive_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end.max(start) - start).num_days() + 1
}

/// Parse a stored event date.
///
/// Accepts plain `YYYY-MM-DD` dates and RFC 3339 timestamps; timestamps are
/// reduced to their calendar date in the offset they were written with.
pub fn parse_event_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| normalize_to_midnight(&dt))
}

/// First day of the given month, or `None` for an invalid month.
pub fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Number of days in the given month.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = first_of_month(year, month)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((next - first).num_days() as u32)
}

/// Column of a date in a Sunday-first week (0 = Sunday, 6 = Saturday).
pub fn sunday_column(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}

/// Sunday on or before the given date.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(sunday_column(date)))
}
