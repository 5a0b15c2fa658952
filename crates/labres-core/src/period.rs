//! Report windows: the week, month, quarter or year containing a date.

use crate::calendar::WorkCalendar;
use crate::{LabError, Result};
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    Week,
    Month,
    Quarter,
    Year,
}

impl FromStr for PeriodKind {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "quarter" => Ok(Self::Quarter),
            "year" => Ok(Self::Year),
            _ => Err(LabError::UnknownValue {
                kind: "period kind",
                value: s.to_string(),
            }),
        }
    }
}

/// A time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Period {
    #[must_use]
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Whether `[start, end]` overlaps this window.
    #[must_use]
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        start <= self.end && end >= self.start
    }
}

/// First and last calendar date of the period containing `today`.
///
/// Weeks run Monday to Friday.
fn date_bounds(kind: PeriodKind, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
    let ymd = |y: i32, m: u32, d: u32| NaiveDate::from_ymd_opt(y, m, d).ok_or(LabError::DateOutOfRange);
    let year = today.year();
    match kind {
        PeriodKind::Week => {
            let back = Days::new(u64::from(today.weekday().num_days_from_monday()));
            let monday = today.checked_sub_days(back).ok_or(LabError::DateOutOfRange)?;
            let friday = monday.checked_add_days(Days::new(4)).ok_or(LabError::DateOutOfRange)?;
            Ok((monday, friday))
        }
        PeriodKind::Month => {
            let first = ymd(year, today.month(), 1)?;
            Ok((first, last_of_month(first)?))
        }
        PeriodKind::Quarter => {
            let first_month = today.month() - (today.month() - 1) % 3;
            let first = ymd(year, first_month, 1)?;
            let last = last_of_month(ymd(year, first_month + 2, 1)?)?;
            Ok((first, last))
        }
        PeriodKind::Year => Ok((ymd(year, 1, 1)?, ymd(year, 12, 31)?)),
    }
}

fn last_of_month(first: NaiveDate) -> Result<NaiveDate> {
    let next = first
        .checked_add_months(chrono::Months::new(1))
        .ok_or(LabError::DateOutOfRange)?;
    next.pred_opt().ok_or(LabError::DateOutOfRange)
}

/// Calendar bounds `[first 00:00, day after last 00:00)`.
pub fn natural_period(kind: PeriodKind, today: NaiveDate) -> Result<Period> {
    let (first, last) = date_bounds(kind, today)?;
    let after = last.succ_opt().ok_or(LabError::DateOutOfRange)?;
    Ok(Period::new(
        first.and_time(NaiveTime::MIN),
        after.and_time(NaiveTime::MIN),
    ))
}

impl WorkCalendar {
    /// Opening of the first workday to closing of the last workday of the
    /// period containing `today`.
    ///
    /// A period without any workday collapses to the opening of its first
    /// date.
    pub fn working_period(&self, kind: PeriodKind, today: NaiveDate) -> Result<Period> {
        let (first, last) = date_bounds(kind, today)?;
        let wd = self.workday();
        let days: Vec<NaiveDate> = first
            .iter_days()
            .take_while(|d| *d <= last)
            .filter(|d| self.is_workday(*d))
            .collect();
        match (days.first(), days.last()) {
            (Some(f), Some(l)) => Ok(Period::new(wd.opening(*f), wd.closing(*l))),
            _ => Ok(Period::new(wd.opening(first), wd.opening(first))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn week_runs_monday_to_friday() {
        let cal = WorkCalendar::default();
        let p = cal.working_period(PeriodKind::Week, date(2025, 3, 13)).unwrap();
        assert_eq!(p.start, at(2025, 3, 10, 9));
        assert_eq!(p.end, at(2025, 3, 14, 19));
    }

    #[test]
    fn month_trims_leading_and_trailing_holidays() {
        let cal = WorkCalendar::default();
        // March 2025 starts on a Saturday and ends on a Monday.
        let p = cal.working_period(PeriodKind::Month, date(2025, 3, 20)).unwrap();
        assert_eq!(p.start, at(2025, 3, 3, 9));
        assert_eq!(p.end, at(2025, 3, 31, 19));
    }

    #[test]
    fn quarter_bounds() {
        let cal = WorkCalendar::default();
        let p = cal.working_period(PeriodKind::Quarter, date(2025, 8, 15)).unwrap();
        assert_eq!(p.start, at(2025, 7, 1, 9));
        assert_eq!(p.end, at(2025, 9, 30, 19));
    }

    #[test]
    fn year_trims_new_year_holiday() {
        let cal = WorkCalendar::default().with_holidays([date(2025, 1, 1)]);
        let p = cal.working_period(PeriodKind::Year, date(2025, 5, 5)).unwrap();
        assert_eq!(p.start, at(2025, 1, 2, 9));
        assert_eq!(p.end, at(2025, 12, 31, 19));
    }

    #[test]
    fn holiday_week_collapses() {
        let cal = WorkCalendar::default().with_holidays(date(2025, 9, 29).iter_days().take(5));
        let p = cal.working_period(PeriodKind::Week, date(2025, 10, 1)).unwrap();
        assert_eq!(p.start, p.end);
    }

    #[test]
    fn natural_period_is_half_open_days() {
        let p = natural_period(PeriodKind::Month, date(2024, 2, 10)).unwrap();
        assert_eq!(p.start, at(2024, 2, 1, 0));
        assert_eq!(p.end, at(2024, 3, 1, 0));

        let p = natural_period(PeriodKind::Week, date(2025, 3, 16)).unwrap();
        assert_eq!(p.start, at(2025, 3, 10, 0));
        assert_eq!(p.end, at(2025, 3, 15, 0));
    }

    #[test]
    fn parses_kinds() {
        assert_eq!("Quarter".parse::<PeriodKind>().unwrap(), PeriodKind::Quarter);
        let err = "decade".parse::<PeriodKind>().unwrap_err();
        assert!(matches!(err, LabError::UnknownValue { kind: "period kind", .. }));
    }
}
