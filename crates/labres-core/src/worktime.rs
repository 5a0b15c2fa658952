//! # Work-Hour Arithmetic
//!
//! Measures and consumes working time on a [`WorkCalendar`].
//!
//! Only the daily working window of working days counts. Everything else
//! (nights, rest days, holidays) is skipped.
//!
//! ## Invariant
//!
//! For any start `s` and duration `h`:
//! `work_hours_between(s, end_time_for(s, h)) == h`.

use crate::calendar::WorkCalendar;
use crate::{LabError, Result, fixed};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

const SECONDS_PER_CENTIHOUR: i64 = 36;

/// One million hours.
const MAX_CENTIHOURS: i64 = 100_000_000;

// =============================================================================
// WORK HOURS
// =============================================================================

/// A duration of working time in hundredths of an hour.
///
/// Rendered and parsed as a two-decimal string (`"12.50"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WorkHours(i64);

impl WorkHours {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(MAX_CENTIHOURS);

    #[must_use]
    pub const fn from_centihours(centihours: i64) -> Self {
        Self(centihours)
    }

    #[must_use]
    pub const fn from_hours(hours: i64) -> Self {
        Self(hours.saturating_mul(100))
    }

    /// Round a number of seconds half up to the nearest centihour.
    #[must_use]
    pub fn from_seconds(seconds: i64) -> Self {
        Self(fixed::div_round(
            i128::from(seconds),
            i128::from(SECONDS_PER_CENTIHOUR),
        ) as i64)
    }

    #[must_use]
    pub const fn centihours(self) -> i64 {
        self.0
    }

    pub fn seconds(self) -> Result<i64> {
        if self.0.abs() > MAX_CENTIHOURS {
            return Err(LabError::InvalidAmount(self.to_string()));
        }
        self.0
            .checked_mul(SECONDS_PER_CENTIHOUR)
            .ok_or_else(|| LabError::InvalidAmount(self.to_string()))
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Difference clamped at zero.
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0).max(0))
    }
}

impl Add for WorkHours {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for WorkHours {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl std::iter::Sum for WorkHours {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, h| acc + h)
    }
}

impl fmt::Display for WorkHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fixed::format(self.0, 2))
    }
}

impl FromStr for WorkHours {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self> {
        fixed::parse(s, 2)
            .filter(|v| v.abs() <= MAX_CENTIHOURS)
            .map(Self)
            .ok_or_else(|| LabError::InvalidAmount(s.to_string()))
    }
}

impl Serialize for WorkHours {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for WorkHours {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// CALENDAR ARITHMETIC
// =============================================================================

impl WorkCalendar {
    /// The next working instant at or after `t`.
    ///
    /// Before opening moves to opening; at or after closing, or on a
    /// holiday, moves to the opening of the next working day.
    pub fn clamp_forward(&self, t: NaiveDateTime) -> Result<NaiveDateTime> {
        let wd = self.workday();
        let date = t.date();
        if self.is_holiday(date) || t.time() >= wd.end() {
            let next = date.succ_opt().ok_or(LabError::DateOutOfRange)?;
            return Ok(wd.opening(self.next_workday(next)?));
        }
        if t.time() < wd.start() {
            return Ok(wd.opening(date));
        }
        Ok(t)
    }

    /// The last working instant at or before `t`.
    ///
    /// At or before opening, or on a holiday, moves to the closing of the
    /// previous working day; after closing moves to closing.
    pub fn clamp_backward(&self, t: NaiveDateTime) -> Result<NaiveDateTime> {
        let wd = self.workday();
        let date = t.date();
        if self.is_holiday(date) || t.time() <= wd.start() {
            let prev = date.pred_opt().ok_or(LabError::DateOutOfRange)?;
            return Ok(wd.closing(self.previous_workday(prev)?));
        }
        if t.time() > wd.end() {
            return Ok(wd.closing(date));
        }
        Ok(t)
    }

    /// Working seconds in `[start, end]`.
    pub fn work_seconds_between(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<i64> {
        if end <= start {
            return Ok(0);
        }
        let start = self.clamp_forward(start)?;
        let end = self.clamp_backward(end)?;
        if start >= end {
            return Ok(0);
        }

        let wd = self.workday();
        let (first, last) = (start.date(), end.date());
        if first == last {
            return Ok((end - start).num_seconds());
        }

        let head = (wd.closing(first) - start).num_seconds();
        let tail = (end - wd.opening(last)).num_seconds();
        let middle = self.workdays_between(first, last) * wd.seconds();
        Ok(head + middle + tail)
    }

    /// Working hours between two instants, rounded to the centihour.
    pub fn work_hours_between(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<WorkHours> {
        self.work_seconds_between(start, end)
            .map(WorkHours::from_seconds)
    }

    /// The instant reached after consuming `hours` of working time from
    /// `start`.
    ///
    /// Exhausting a day exactly ends at that day's closing time. Amounts
    /// above [`WorkHours::MAX`] are rejected.
    pub fn end_time_for(&self, start: NaiveDateTime, hours: WorkHours) -> Result<NaiveDateTime> {
        let wd = self.workday();
        let mut remaining = hours.seconds()?.max(0);
        let mut cursor = self.clamp_forward(start)?;

        loop {
            let available = (wd.closing(cursor.date()) - cursor).num_seconds();
            if remaining <= available {
                return Ok(cursor + Duration::seconds(remaining));
            }
            remaining -= available;
            let next = cursor.date().succ_opt().ok_or(LabError::DateOutOfRange)?;
            cursor = wd.opening(self.next_workday(next)?);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
