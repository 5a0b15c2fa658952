//! Return applications and their confirmation.
//!
//! A borrower files one return application per checked-out record. The lab
//! manager confirms it, which settles the actual working hours and the
//! billed amount and frees (or quarantines) the equipment.

use crate::borrow::{BorrowRecord, ReturnStatus, next_borrower};
use crate::calendar::WorkCalendar;
use crate::equipment::{Equipment, EquipmentState};
use crate::money::Money;
use crate::worktime::WorkHours;
use crate::{LabError, RecordId, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmState {
    Normal,
    Damaged,
}

/// What the borrower reports when handing the equipment back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub borrow: RecordId,
    pub return_time: NaiveDateTime,
    #[serde(default)]
    pub position: Option<String>,
    /// The borrow stopped early and may be resumed later.
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// A filed return, keyed by the borrow it closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnApplication {
    pub borrow: RecordId,
    pub return_time: NaiveDateTime,
    pub position: Option<String>,
    pub interrupted: bool,
    pub confirmed: bool,
    pub confirm_state: Option<ConfirmState>,
    pub remarks: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Outcome of a confirmed return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub record: RecordId,
    pub actual_hours: WorkHours,
    /// `None` when the equipment has no hourly price.
    pub total: Option<Money>,
    pub equipment_state: EquipmentState,
    /// Approved queued borrower to notify. Only set for normal returns.
    pub next_borrower: Option<RecordId>,
}

/// File a return for a checked-out record.
pub fn request_return(
    record: &mut BorrowRecord,
    existing: Option<&ReturnApplication>,
    request: ReturnRequest,
    created_at: NaiveDateTime,
) -> Result<ReturnApplication> {
    if existing.is_some() || record.return_status != ReturnStatus::NotReturned {
        return Err(LabError::ReturnAlreadyRequested(record.id));
    }
    if record.deleted || !record.borrowed {
        return Err(LabError::InvalidTransition(format!(
            "borrow {} has not been checked out",
            record.id
        )));
    }
    record.return_status = ReturnStatus::PendingConfirm;
    record.interrupted = request.interrupted;
    Ok(ReturnApplication {
        borrow: record.id,
        return_time: request.return_time,
        position: request.position,
        interrupted: request.interrupted,
        confirmed: false,
        confirm_state: None,
        remarks: request.remarks,
        created_at,
    })
}

/// Confirm a filed return and settle the borrow.
///
/// `queue` is every record of the equipment, used to find the next
/// borrower.
pub fn confirm_return(
    calendar: &WorkCalendar,
    record: &mut BorrowRecord,
    application: &mut ReturnApplication,
    equipment: &mut Equipment,
    state: ConfirmState,
    queue: &[BorrowRecord],
) -> Result<Settlement> {
    if application.confirmed || record.return_status == ReturnStatus::Returned {
        return Err(LabError::InvalidTransition(format!(
            "return of borrow {} is already confirmed",
            record.id
        )));
    }

    let returned_at = application.return_time;
    let actual_hours = calendar.work_hours_between(record.start, returned_at)?;
    let total = record.per_hour_price.map(|p| p.for_hours(actual_hours));

    record.return_status = ReturnStatus::Returned;
    record.interrupted = application.interrupted;
    record.actual_end = Some(returned_at);
    record.actual_hours = actual_hours;
    record.total_amount = total;

    equipment.state = match state {
        ConfirmState::Normal => EquipmentState::Available,
        ConfirmState::Damaged => EquipmentState::Maintenance,
    };
    if application.position.is_some() {
        equipment.deposit_position = application.position.clone();
    }

    application.confirmed = true;
    application.confirm_state = Some(state);

    let next = match state {
        ConfirmState::Normal => next_borrower(queue, &equipment.id, returned_at).map(|r| r.id),
        ConfirmState::Damaged => None,
    };

    Ok(Settlement {
        record: record.id,
        actual_hours,
        total,
        equipment_state: equipment.state,
        next_borrower: next,
    })
}
