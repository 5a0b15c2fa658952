//! # Usage Report
//!
//! Working hours each piece of equipment was actually used inside a report
//! window, compared with the working hours the window offers.
//!
//! Only returned records count. A record reaching outside the window is
//! clipped to it and the clipped part is measured again on the calendar;
//! a record fully inside keeps its settled actual hours.

use crate::borrow::{BorrowRecord, ReturnStatus};
use crate::calendar::WorkCalendar;
use crate::money::Money;
use crate::period::Period;
use crate::worktime::WorkHours;
use crate::{EquipmentId, RecordId, Result, UserId, fixed};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One borrow as seen by the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLine {
    pub record: RecordId,
    pub user: UserId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub hours: WorkHours,
    pub amount: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentUsage {
    pub equipment_id: EquipmentId,
    pub usage: WorkHours,
    pub available: WorkHours,
    /// `usage / available` in basis points.
    pub rate_bp: i64,
    pub amount: Money,
    /// Lines ordered by start.
    pub lines: Vec<UsageLine>,
}

impl EquipmentUsage {
    /// Usage rate as a percentage with two decimals, e.g. `"37.50%"`.
    #[must_use]
    pub fn rate_percent(&self) -> String {
        format!("{}%", fixed::format(self.rate_bp, 2))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    pub window: Period,
    pub available: WorkHours,
    /// Ordered by equipment id.
    pub equipment: Vec<EquipmentUsage>,
}

impl UsageReport {
    pub fn build(calendar: &WorkCalendar, records: &[BorrowRecord], window: Period) -> Result<Self> {
        let available = calendar.work_hours_between(window.start, window.end)?;

        let mut grouped: BTreeMap<EquipmentId, Vec<UsageLine>> = BTreeMap::new();
        for record in records {
            let Some(clip) = clip_returned(calendar, record, window)? else {
                continue;
            };
            grouped
                .entry(record.equipment_id.clone())
                .or_default()
                .push(UsageLine {
                    record: record.id,
                    user: record.user,
                    start: clip.start,
                    end: clip.end,
                    hours: clip.hours,
                    amount: record.per_hour_price.map(|p| p.for_hours(clip.hours)),
                });
        }

        let equipment = grouped
            .into_iter()
            .map(|(equipment_id, mut lines)| {
                lines.sort_by_key(|l| (l.start, l.record));
                let usage: WorkHours = lines.iter().map(|l| l.hours).sum();
                let amount: Money = lines.iter().filter_map(|l| l.amount).sum();
                EquipmentUsage {
                    equipment_id,
                    usage,
                    available,
                    rate_bp: rate_bp(usage, available),
                    amount,
                    lines,
                }
            })
            .collect();

        Ok(Self {
            window,
            available,
            equipment,
        })
    }
}

/// The part of a returned borrow that falls inside a report window.
pub(crate) struct Clip {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub hours: WorkHours,
    /// The record lies fully inside the window.
    pub whole: bool,
}

/// Clip a checked-out, returned record to `window`.
///
/// `None` for records that do not count or do not overlap. A record fully
/// inside keeps its settled actual hours.
pub(crate) fn clip_returned(
    calendar: &WorkCalendar,
    record: &BorrowRecord,
    window: Period,
) -> Result<Option<Clip>> {
    let Some(actual_end) = record.actual_end else {
        return Ok(None);
    };
    if !record.borrowed
        || record.deleted
        || record.return_status != ReturnStatus::Returned
        || !window.overlaps(record.start, actual_end)
    {
        return Ok(None);
    }

    let start = record.start.max(window.start);
    let end = actual_end.min(window.end);
    let whole = start == record.start && end == actual_end;
    let hours = if whole {
        record.actual_hours
    } else {
        calendar.work_hours_between(start, end)?
    };
    Ok(Some(Clip {
        start,
        end,
        hours,
        whole,
    }))
}

pub(crate) fn rate_bp(usage: WorkHours, available: WorkHours) -> i64 {
    if !available.is_positive() {
        return 0;
    }
    fixed::div_round(
        i128::from(usage.centihours()) * 10_000,
        i128::from(available.centihours()),
    ) as i64
}
