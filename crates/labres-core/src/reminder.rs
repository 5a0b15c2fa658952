//! Reminders for borrowers who are about to overrun or already overran.
//!
//! Each reminder fires once: the matching flag on the record
//! (`final_reminded` / `overtime_reminded`) is set when it is applied, and
//! flagged records are skipped on the next scan.

use crate::borrow::{BorrowRecord, ReturnStatus, next_borrower};
use crate::{EquipmentId, RecordId, UserId};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnReminder {
    /// The borrow ends within the lead time.
    DueSoon {
        record: RecordId,
        user: UserId,
        equipment_id: EquipmentId,
        end: NaiveDateTime,
        seconds_left: i64,
    },
    /// The borrow end has passed and the equipment is still out.
    Overdue {
        record: RecordId,
        user: UserId,
        equipment_id: EquipmentId,
        end: NaiveDateTime,
        next_borrower: Option<UserId>,
    },
}

impl ReturnReminder {
    #[must_use]
    pub fn record(&self) -> RecordId {
        match self {
            Self::DueSoon { record, .. } | Self::Overdue { record, .. } => *record,
        }
    }

    /// Set the flag that keeps this reminder from firing again.
    pub fn mark(&self, record: &mut BorrowRecord) {
        match self {
            Self::DueSoon { .. } => record.final_reminded = true,
            Self::Overdue { .. } => record.overtime_reminded = true,
        }
    }
}

impl fmt::Display for ReturnReminder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DueSoon {
                record,
                equipment_id,
                end,
                ..
            } => write!(f, "borrow {} of {} is due at {}", record, equipment_id, end),
            Self::Overdue {
                record,
                equipment_id,
                end,
                next_borrower,
                ..
            } => {
                write!(f, "borrow {} of {} was due at {}", record, equipment_id, end)?;
                if let Some(user) = next_borrower {
                    write!(f, ", next borrower is user {}", user.0)?;
                }
                Ok(())
            }
        }
    }
}

/// Reminders due at `now` with the given lead time.
#[must_use]
pub fn due_reminders(
    records: &[BorrowRecord],
    now: NaiveDateTime,
    lead: Duration,
) -> Vec<ReturnReminder> {
    let lead = lead.num_seconds();
    records
        .iter()
        .filter(|r| {
            r.borrowed
                && !r.deleted
                && r.return_status != ReturnStatus::Returned
                && !r.overtime_reminded
        })
        .filter_map(|r| {
            let left = (r.end - now).num_seconds();
            if 0 < left && left < lead && !r.final_reminded {
                Some(ReturnReminder::DueSoon {
                    record: r.id,
                    user: r.user,
                    equipment_id: r.equipment_id.clone(),
                    end: r.end,
                    seconds_left: left,
                })
            } else if left < 0 {
                Some(ReturnReminder::Overdue {
                    record: r.id,
                    user: r.user,
                    equipment_id: r.equipment_id.clone(),
                    end: r.end,
                    next_borrower: next_borrower(records, &r.equipment_id, r.end).map(|n| n.user),
                })
            } else {
                None
            }
        })
        .collect()
}
