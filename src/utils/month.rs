//! Calendar month arithmetic.
//!
//! Ledger entries are attributed to a month, stored as the first day of that
//! month. All helpers here work in UTC.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};

/// Truncate a date to the first day of its month.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the month containing `at`.
pub fn month_of(at: DateTime<Utc>) -> NaiveDate {
    month_start(at.date_naive())
}

/// Shift a month start forward by `months`, saturating at the calendar end.
pub fn add_months(month: NaiveDate, months: u32) -> NaiveDate {
    month
        .checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// Shift a month start backward by `months`, saturating at the calendar start.
pub fn sub_months(month: NaiveDate, months: u32) -> NaiveDate {
    month
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

/// Half-open bounds `[start, end)` of the month containing `month`.
pub fn month_bounds(month: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = month_start(month);
    (start, add_months(start, 1))
}

/// Midnight UTC at the start of `date`.
pub fn at_midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Format a month as `YYYY-MM`.
pub fn format_month(month: NaiveDate) -> String {
    month.format("%Y-%m").to_string()
}
