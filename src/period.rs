//! Period and date utilities
//!
//! The single source of truth for "which period is in progress". Both the
//! aggregator (exclusion from totals) and the scorer (finalized snapshot
//! selection) go through [`current_index`] and [`latest_finalized_index`].
//! "Now" is always passed in; nothing here reads the wall clock.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

/// Anything with an inclusive calendar date range
pub trait Dated {
    fn start_date(&self) -> NaiveDate;
    fn end_date(&self) -> NaiveDate;
}

impl Dated for crate::types::PeriodRecord {
    fn start_date(&self) -> NaiveDate {
        self.start_date
    }
    fn end_date(&self) -> NaiveDate {
        self.end_date
    }
}

/// First instant after a period ending on `end`, i.e. midnight of the next day
pub fn period_close(end: NaiveDate) -> NaiveDateTime {
    (end + Duration::days(1)).and_time(NaiveTime::MIN)
}

/// First instant of the following day; acknowledgments expire here
pub fn next_midnight(now: NaiveDateTime) -> NaiveDateTime {
    let tomorrow = now.date() + Duration::days(1);
    tomorrow.and_time(NaiveTime::MIN)
}

/// Whether a period's end date has fully elapsed relative to `now`
pub fn is_finalized(end: NaiveDate, now: NaiveDateTime) -> bool {
    now >= period_close(end)
}

/// Index of the in-progress period in a chronologically sorted slice.
///
/// Only the latest period can be current: it is current until midnight after
/// its end date. If it has, every period is finalized.
pub fn current_index<T: Dated>(periods: &[T], now: NaiveDateTime) -> Option<usize> {
    let last = periods.len().checked_sub(1)?;
    if now < period_close(periods[last].end_date()) {
        Some(last)
    } else {
        None
    }
}

/// Index of the latest period that is neither current nor still running
pub fn latest_finalized_index<T: Dated>(periods: &[T], now: NaiveDateTime) -> Option<usize> {
    let current = current_index(periods, now);
    periods
        .iter()
        .enumerate()
        .rev()
        .find(|(i, p)| Some(*i) != current && is_finalized(p.end_date(), now))
        .map(|(i, _)| i)
}

/// Monday of the ISO week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// First Monday on or after the first day of the month
pub fn first_monday_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let offset = (7 + Weekday::Mon.num_days_from_monday() as i64
        - first.weekday().num_days_from_monday() as i64)
        % 7;
    Some(first + Duration::days(offset))
}

/// Start of the next weekly period
pub fn next_week(start: NaiveDate) -> NaiveDate {
    start + Duration::days(7)
}

/// Whether a date falls in the given month
pub fn in_month(date: NaiveDate, year: i32, month: u32) -> bool {
    date.year() == year && date.month() == month
}

/// Calendar quarter (1-4) of a month
pub fn quarter_of(month: u32) -> u32 {
    (month.saturating_sub(1)) / 3 + 1
}

/// The three months of a quarter
pub fn quarter_months(quarter: u32) -> [u32; 3] {
    let first = (quarter.clamp(1, 4) - 1) * 3 + 1;
    [first, first + 1, first + 2]
}

/// Last day of a month
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1).map(|d| d - Duration::days(1))
}

/// Week column label, e.g. `10/05`
pub fn week_label(start: NaiveDate) -> String {
    start.format("%m/%d").to_string()
}

/// Month column label, e.g. `Oct 2026`
pub fn month_label(year: i32, month: u32) -> String {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|d| d.format("%b %Y").to_string())
        .unwrap_or_else(|| format!("{}-{:02}", year, month))
}

/// Quarter label, e.g. `Q4 2026`
pub fn quarter_label(year: i32, quarter: u32) -> String {
    format!("Q{} {}", quarter, year)
}
