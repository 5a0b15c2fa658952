//! # Calibration and Preventive Maintenance
//!
//! Due-date tracking for external calibration and the quarterly PM plan,
//! plus the equipment state changes that follow a calibration.
//!
//! A recalibration date is the calibration date plus the cycle, minus one
//! day. Fewer than [`DUE_SOON_DAYS`] days before it the status flips to
//! "ASAP" and the daily refresh marks the calibration as pending
//! submission.

use crate::equipment::EquipmentState;
use crate::{EquipmentId, LabError, RecordId, Result};
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Days before the recalibration date at which upkeep becomes urgent.
pub const DUE_SOON_DAYS: i64 = 30;

/// Calibration cycle used when none is given.
pub const DEFAULT_CYCLE_MONTHS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationState {
    Completed,
    PendingSubmission,
    SentOut,
}

impl CalibrationState {
    /// Equipment state implied by entering this calibration state, if it
    /// changes anything.
    #[must_use]
    pub fn equipment_transition(self, current: EquipmentState) -> Option<EquipmentState> {
        match self {
            Self::SentOut if current != EquipmentState::Maintenance => {
                Some(EquipmentState::Maintenance)
            }
            Self::Completed if current == EquipmentState::Maintenance => {
                Some(EquipmentState::Available)
            }
            _ => None,
        }
    }
}

/// Which upkeep a due status refers to. Only the wording differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpkeepKind {
    Calibration,
    Maintain,
}

/// Days left until the recalibration date, or a request to act now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DueStatus {
    Days(i64),
    Asap(UpkeepKind),
}

impl DueStatus {
    #[must_use]
    pub fn is_asap(self) -> bool {
        matches!(self, Self::Asap(_))
    }
}

impl fmt::Display for DueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Days(days) => write!(f, "{}", days),
            Self::Asap(UpkeepKind::Calibration) => f.write_str("Please perform calibration ASAP"),
            Self::Asap(UpkeepKind::Maintain) => {
                f.write_str("Please perform PM-Y and external Cal ASAP")
            }
        }
    }
}

/// `calibration + months - 1 day`. Month ends clamp.
pub fn recalibration_date(calibration: NaiveDate, months: u32) -> Result<NaiveDate> {
    calibration
        .checked_add_months(Months::new(months))
        .and_then(|d| d.pred_opt())
        .ok_or(LabError::DateOutOfRange)
}

#[must_use]
pub fn due_status(recalibration: NaiveDate, today: NaiveDate, kind: UpkeepKind) -> DueStatus {
    let days = (recalibration - today).num_days();
    if days < DUE_SOON_DAYS {
        DueStatus::Asap(kind)
    } else {
        DueStatus::Days(days)
    }
}

/// Quarterly PM dates of the year ending at `recalibration`.
///
/// The first date is the recalibration date moved back into its year's
/// first quarter; the others follow every three months.
pub fn pm_quarters(recalibration: NaiveDate) -> Result<[NaiveDate; 4]> {
    let back = match recalibration.month() {
        1..=3 => 0,
        4..=6 => 3,
        7..=9 => 6,
        _ => 9,
    };
    let q1 = recalibration
        .checked_sub_months(Months::new(back))
        .ok_or(LabError::DateOutOfRange)?;
    let add = |months: u32| {
        q1.checked_add_months(Months::new(months))
            .ok_or(LabError::DateOutOfRange)
    };
    Ok([q1, add(3)?, add(6)?, add(9)?])
}

// =============================================================================
// CALIBRATION INFO
// =============================================================================

/// External calibration record. One per equipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationInfo {
    pub id: RecordId,
    pub equipment_id: EquipmentId,
    pub specification: Option<String>,
    pub environment: Option<String>,
    pub certificate: Option<String>,
    pub cycle_months: u32,
    pub calibration_date: NaiveDate,
    pub recalibration_date: NaiveDate,
    pub due: DueStatus,
    pub state: CalibrationState,
    pub remarks: Option<String>,
}

impl CalibrationInfo {
    /// Recompute the due status for `today`.
    ///
    /// Returns `true` when the status changed. A status that turns urgent
    /// moves the state to [`CalibrationState::PendingSubmission`].
    pub fn refresh(&mut self, today: NaiveDate) -> bool {
        let due = due_status(self.recalibration_date, today, UpkeepKind::Calibration);
        if due == self.due {
            return false;
        }
        self.due = due;
        if due.is_asap() {
            self.state = CalibrationState::PendingSubmission;
        }
        true
    }
}

/// Fields supplied when creating or editing a calibration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationInput {
    pub equipment_id: EquipmentId,
    pub calibration_date: NaiveDate,
    /// Computed from the cycle when absent.
    #[serde(default)]
    pub recalibration_date: Option<NaiveDate>,
    #[serde(default)]
    pub cycle_months: Option<u32>,
    pub state: CalibrationState,
    #[serde(default)]
    pub specification: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl CalibrationInput {
    pub fn into_info(self, id: RecordId, today: NaiveDate) -> Result<CalibrationInfo> {
        let cycle_months = self.cycle_months.unwrap_or(DEFAULT_CYCLE_MONTHS);
        let recalibration = match self.recalibration_date {
            Some(date) => date,
            None => recalibration_date(self.calibration_date, cycle_months)?,
        };
        if recalibration < self.calibration_date {
            return Err(LabError::InvalidTransition(format!(
                "recalibration date {} precedes calibration date {}",
                recalibration, self.calibration_date
            )));
        }
        Ok(CalibrationInfo {
            id,
            equipment_id: self.equipment_id,
            specification: self.specification,
            environment: self.environment,
            certificate: self.certificate,
            cycle_months,
            calibration_date: self.calibration_date,
            recalibration_date: recalibration,
            due: due_status(recalibration, today, UpkeepKind::Calibration),
            state: self.state,
            remarks: self.remarks,
        })
    }
}

// =============================================================================
// MAINTAIN INFO
// =============================================================================

/// Preventive-maintenance plan of a piece of equipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintainInfo {
    pub id: RecordId,
    pub equipment_id: EquipmentId,
    pub calibration_date: NaiveDate,
    pub recalibration_date: NaiveDate,
    pub due: DueStatus,
    /// PM dates for Q1..Q4.
    pub pm: [NaiveDate; 4],
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintainInput {
    pub equipment_id: EquipmentId,
    pub calibration_date: NaiveDate,
    #[serde(default)]
    pub recalibration_date: Option<NaiveDate>,
    #[serde(default)]
    pub cycle_months: Option<u32>,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl MaintainInput {
    pub fn into_info(self, id: RecordId, today: NaiveDate) -> Result<MaintainInfo> {
        let recalibration = match self.recalibration_date {
            Some(date) => date,
            None => recalibration_date(
                self.calibration_date,
                self.cycle_months.unwrap_or(DEFAULT_CYCLE_MONTHS),
            )?,
        };
        Ok(MaintainInfo {
            id,
            equipment_id: self.equipment_id,
            calibration_date: self.calibration_date,
            recalibration_date: recalibration,
            due: due_status(recalibration, today, UpkeepKind::Maintain),
            pm: pm_quarters(recalibration)?,
            remarks: self.remarks,
        })
    }
}

/// A repair carried out on a piece of equipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub id: RecordId,
    pub equipment_id: EquipmentId,
    pub down_time: NaiveDateTime,
    pub up_time: NaiveDateTime,
    pub reason: Option<String>,
    pub maintainer: Option<String>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn input(calibrated: NaiveDate) -> CalibrationInput {
        CalibrationInput {
            equipment_id: EquipmentId::new("EQ-7"),
            calibration_date: calibrated,
            recalibration_date: None,
            cycle_months: None,
            state: CalibrationState::Completed,
            specification: None,
            environment: None,
            certificate: None,
            remarks: None,
        }
    }

    #[test]
    fn recalibration_is_one_day_before_the_anniversary() {
        assert_eq!(recalibration_date(date(2025, 3, 15), 12).unwrap(), date(2026, 3, 14));
        // Month end clamps before subtracting the day.
        assert_eq!(recalibration_date(date(2025, 1, 31), 1).unwrap(), date(2025, 2, 27));
    }

    #[test]
    fn due_status_has_thirty_day_threshold() {
        let recal = date(2025, 7, 31);
        assert_eq!(
            due_status(recal, date(2025, 7, 1), UpkeepKind::Calibration),
            DueStatus::Days(30)
        );
        let soon = due_status(recal, date(2025, 7, 2), UpkeepKind::Calibration);
        assert_eq!(soon.to_string(), "Please perform calibration ASAP");
        let overdue = due_status(recal, date(2025, 9, 1), UpkeepKind::Maintain);
        assert_eq!(overdue.to_string(), "Please perform PM-Y and external Cal ASAP");
    }

    #[test]
    fn pm_quarters_anchor_in_first_quarter() {
        assert_eq!(
            pm_quarters(date(2026, 5, 14)).unwrap(),
            [date(2026, 2, 14), date(2026, 5, 14), date(2026, 8, 14), date(2026, 11, 14)]
        );
        assert_eq!(
            pm_quarters(date(2025, 12, 31)).unwrap(),
            [date(2025, 3, 31), date(2025, 6, 30), date(2025, 9, 30), date(2025, 12, 31)]
        );
        assert_eq!(pm_quarters(date(2025, 2, 1)).unwrap()[0], date(2025, 2, 1));
    }

    #[test]
    fn sent_out_and_completed_move_equipment() {
        assert_eq!(
            CalibrationState::SentOut.equipment_transition(EquipmentState::Available),
            Some(EquipmentState::Maintenance)
        );
        assert_eq!(
            CalibrationState::SentOut.equipment_transition(EquipmentState::Maintenance),
            None
        );
        assert_eq!(
            CalibrationState::Completed.equipment_transition(EquipmentState::Maintenance),
            Some(EquipmentState::Available)
        );
        assert_eq!(
            CalibrationState::Completed.equipment_transition(EquipmentState::InUse),
            None
        );
        assert_eq!(
            CalibrationState::PendingSubmission.equipment_transition(EquipmentState::Available),
            None
        );
    }

    #[test]
    fn input_computes_missing_recalibration() {
        let info = input(date(2025, 3, 15))
            .into_info(RecordId(1), date(2025, 4, 1))
            .unwrap();
        assert_eq!(info.recalibration_date, date(2026, 3, 14));
        assert_eq!(info.cycle_months, 12);
        assert_eq!(info.due, DueStatus::Days(347));
    }

    #[test]
    fn input_rejects_recalibration_before_calibration() {
        let mut bad = input(date(2025, 3, 15));
        bad.recalibration_date = Some(date(2025, 1, 1));
        assert!(bad.into_info(RecordId(1), date(2025, 4, 1)).is_err());
    }

    #[test]
    fn refresh_marks_pending_submission_once() {
        let mut info = input(date(2024, 8, 1))
            .into_info(RecordId(1), date(2025, 1, 1))
            .unwrap();
        assert!(info.refresh(date(2025, 1, 2)));
        assert_eq!(info.state, CalibrationState::Completed);

        assert!(info.refresh(date(2025, 7, 20)));
        assert_eq!(info.state, CalibrationState::PendingSubmission);
        assert!(!info.refresh(date(2025, 7, 21)));
    }

    #[test]
    fn maintain_input_plans_quarters() {
        let info = MaintainInput {
            equipment_id: EquipmentId::new("EQ-7"),
            calibration_date: date(2025, 5, 15),
            recalibration_date: None,
            cycle_months: None,
            remarks: None,
        }
        .into_info(RecordId(3), date(2026, 5, 1))
        .unwrap();
        assert_eq!(info.recalibration_date, date(2026, 5, 14));
        assert_eq!(info.pm[0], date(2026, 2, 14));
        assert!(info.due.is_asap());
    }
}
