//! # Work Calendar
//!
//! Decides which dates are working days and when the working window of a
//! day opens and closes.
//!
//! ## Precedence
//!
//! A date is a holiday iff:
//! - it is NOT a make-up workday (weekend days worked in exchange for a
//!   statutory holiday), AND
//! - it is a listed holiday OR falls on a rest weekday.

use crate::{LabError, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Upper bound on how far `next_workday` / `previous_workday` search.
pub const SEARCH_HORIZON_DAYS: i64 = 731;

// =============================================================================
// WORK DAY
// =============================================================================

/// Daily working window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDay {
    start: NaiveTime,
    end: NaiveTime,
}

impl WorkDay {
    /// Create a working window. `start` must be before `end`.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self> {
        if start >= end {
            return Err(LabError::InvalidWorkDay {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub fn start(&self) -> NaiveTime {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// Length of the working window in seconds.
    #[must_use]
    pub fn seconds(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }

    /// Opening instant on `date`.
    #[must_use]
    pub fn opening(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.start)
    }

    /// Closing instant on `date`.
    #[must_use]
    pub fn closing(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.end)
    }
}

impl Default for WorkDay {
    /// 09:00 - 19:00.
    fn default() -> Self {
        Self {
            start: NaiveTime::MIN + Duration::hours(9),
            end: NaiveTime::MIN + Duration::hours(19),
        }
    }
}

// =============================================================================
// WORK CALENDAR
// =============================================================================

/// Holiday-aware calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkCalendar {
    workday: WorkDay,
    /// Rest weekdays as `num_days_from_monday` (0 = Monday).
    rest_days: BTreeSet<u32>,
    holidays: BTreeSet<NaiveDate>,
    makeup_workdays: BTreeSet<NaiveDate>,
}

impl Default for WorkCalendar {
    fn default() -> Self {
        Self::new(WorkDay::default())
    }
}

impl WorkCalendar {
    /// A calendar resting on Saturdays and Sundays with no listed holidays.
    #[must_use]
    pub fn new(workday: WorkDay) -> Self {
        Self {
            workday,
            rest_days: [Weekday::Sat, Weekday::Sun]
                .iter()
                .map(|d| d.num_days_from_monday())
                .collect(),
            holidays: BTreeSet::new(),
            makeup_workdays: BTreeSet::new(),
        }
    }

    /// Replace the rest weekdays.
    #[must_use]
    pub fn with_rest_days(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.rest_days = days.into_iter().map(|d| d.num_days_from_monday()).collect();
        self
    }

    /// Add listed holidays.
    #[must_use]
    pub fn with_holidays(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(dates);
        self
    }

    /// Add make-up workdays.
    #[must_use]
    pub fn with_makeup_workdays(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.makeup_workdays.extend(dates);
        self
    }

    #[must_use]
    pub fn workday(&self) -> &WorkDay {
        &self.workday
    }

    /// Whether `date` is a non-working day.
    #[must_use]
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        if self.makeup_workdays.contains(&date) {
            return false;
        }
        self.holidays.contains(&date)
            || self
                .rest_days
                .contains(&date.weekday().num_days_from_monday())
    }

    /// Whether `date` is a working day.
    #[must_use]
    pub fn is_workday(&self, date: NaiveDate) -> bool {
        !self.is_holiday(date)
    }

    /// Every non-working date of `year`, in order.
    pub fn holidays_in_year(&self, year: i32) -> Result<Vec<NaiveDate>> {
        let first = NaiveDate::from_ymd_opt(year, 1, 1).ok_or(LabError::DateOutOfRange)?;
        Ok(first
            .iter_days()
            .take_while(|d| d.year() == year)
            .filter(|d| self.is_holiday(*d))
            .collect())
    }

    /// First working date on or after `date`.
    pub fn next_workday(&self, date: NaiveDate) -> Result<NaiveDate> {
        let mut day = date;
        for _ in 0..SEARCH_HORIZON_DAYS {
            if self.is_workday(day) {
                return Ok(day);
            }
            day = day.succ_opt().ok_or(LabError::DateOutOfRange)?;
        }
        Err(LabError::CalendarExhausted { from: date })
    }

    /// Last working date on or before `date`.
    pub fn previous_workday(&self, date: NaiveDate) -> Result<NaiveDate> {
        let mut day = date;
        for _ in 0..SEARCH_HORIZON_DAYS {
            if self.is_workday(day) {
                return Ok(day);
            }
            day = day.pred_opt().ok_or(LabError::DateOutOfRange)?;
        }
        Err(LabError::CalendarExhausted { from: date })
    }

    /// Number of working dates strictly between `from` and `to`.
    #[must_use]
    pub fn workdays_between(&self, from: NaiveDate, to: NaiveDate) -> i64 {
        if to <= from {
            return 0;
        }
        from.iter_days()
            .skip(1)
            .take_while(|d| *d < to)
            .filter(|d| self.is_workday(*d))
            .count() as i64
    }
}

// =============================================================================
// TESTS
// =============================================================================
