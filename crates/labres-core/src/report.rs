//! # Upkeep and Fee Reports
//!
//! Repair downtime per piece of equipment and billed borrow fees per
//! project, both over a report window. Records reaching outside the
//! window are clipped to it and measured again on the calendar, like the
//! usage report.

use crate::borrow::BorrowRecord;
use crate::calendar::WorkCalendar;
use crate::calibration::MaintenanceRecord;
use crate::money::Money;
use crate::period::Period;
use crate::usage::{clip_returned, rate_bp};
use crate::worktime::WorkHours;
use crate::{EquipmentId, Result, fixed};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// MAINTENANCE TIME
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceTime {
    /// Set when the report is restricted to one maintainer.
    pub maintainer: Option<String>,
    pub equipment_id: EquipmentId,
    pub hours: WorkHours,
    /// `hours / available` in basis points.
    pub rate_bp: i64,
}

impl MaintenanceTime {
    #[must_use]
    pub fn rate_percent(&self) -> String {
        format!("{}%", fixed::format(self.rate_bp, 2))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceTimeReport {
    pub window: Period,
    pub available: WorkHours,
    /// Ordered by equipment id.
    pub lines: Vec<MaintenanceTime>,
}

impl MaintenanceTimeReport {
    /// Working hours each piece of equipment spent under repair.
    ///
    /// With `maintainer`, only that maintainer's repairs count.
    pub fn build(
        calendar: &WorkCalendar,
        records: &[MaintenanceRecord],
        window: Period,
        maintainer: Option<&str>,
    ) -> Result<Self> {
        let available = calendar.work_hours_between(window.start, window.end)?;

        let mut grouped: BTreeMap<EquipmentId, WorkHours> = BTreeMap::new();
        for record in records {
            if maintainer.is_some_and(|m| record.maintainer.as_deref() != Some(m)) {
                continue;
            }
            if !window.overlaps(record.down_time, record.up_time) {
                continue;
            }
            let down = record.down_time.max(window.start);
            let up = record.up_time.min(window.end);
            let hours = calendar.work_hours_between(down, up)?;
            let total = grouped.entry(record.equipment_id.clone()).or_default();
            *total = *total + hours;
        }

        let lines = grouped
            .into_iter()
            .map(|(equipment_id, hours)| MaintenanceTime {
                maintainer: maintainer.map(str::to_string),
                equipment_id,
                hours,
                rate_bp: rate_bp(hours, available),
            })
            .collect();

        Ok(Self {
            window,
            available,
            lines,
        })
    }
}

// =============================================================================
// FEES
// =============================================================================

/// Narrows the fee report. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeFilter {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub equipment: Option<EquipmentId>,
}

impl FeeFilter {
    fn matches(&self, record: &BorrowRecord) -> bool {
        let same = |want: &Option<String>, have: &Option<String>| {
            want.as_ref().is_none_or(|w| have.as_ref() == Some(w))
        };
        same(&self.project, &record.project)
            && same(&self.section, &record.section)
            && self.equipment.as_ref().is_none_or(|e| *e == record.equipment_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeLine {
    pub section: Option<String>,
    pub equipment_id: EquipmentId,
    pub hours: WorkHours,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFees {
    pub project: Option<String>,
    /// Ordered by section, then equipment id.
    pub lines: Vec<FeeLine>,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeReport {
    pub window: Period,
    /// Ordered by project name, records without a project first.
    pub projects: Vec<ProjectFees>,
    pub total: Money,
}

type FeeKey = (Option<String>, Option<String>, EquipmentId);

impl FeeReport {
    /// Billed amounts of returned borrows grouped by project, section and
    /// equipment.
    ///
    /// Only settled records with a total count. A record fully inside the
    /// window keeps its settled total; a clipped one is billed again at
    /// its hourly price for the clipped hours.
    pub fn build(
        calendar: &WorkCalendar,
        records: &[BorrowRecord],
        window: Period,
        filter: &FeeFilter,
    ) -> Result<Self> {
        let mut grouped: BTreeMap<FeeKey, (WorkHours, Money)> = BTreeMap::new();
        for record in records {
            let Some(total) = record.total_amount else {
                continue;
            };
            if !filter.matches(record) {
                continue;
            }
            let Some(clip) = clip_returned(calendar, record, window)? else {
                continue;
            };
            let amount = if clip.whole {
                total
            } else {
                record
                    .per_hour_price
                    .map_or(Money::ZERO, |p| p.for_hours(clip.hours))
            };
            let key = (
                record.project.clone(),
                record.section.clone(),
                record.equipment_id.clone(),
            );
            let entry = grouped.entry(key).or_default();
            entry.0 = entry.0 + clip.hours;
            entry.1 = entry.1 + amount;
        }

        let mut projects: Vec<ProjectFees> = Vec::new();
        for ((project, section, equipment_id), (hours, amount)) in grouped {
            let line = FeeLine {
                section,
                equipment_id,
                hours,
                amount,
            };
            match projects.last_mut() {
                Some(last) if last.project == project => {
                    last.total = last.total + amount;
                    last.lines.push(line);
                }
                _ => projects.push(ProjectFees {
                    project,
                    lines: vec![line],
                    total: amount,
                }),
            }
        }
        let total = projects.iter().map(|p| p.total).sum();

        Ok(Self {
            window,
            projects,
            total,
        })
    }
}
