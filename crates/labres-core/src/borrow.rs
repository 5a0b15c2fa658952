//! # Borrow Scheduling
//!
//! Validation of borrow applications against the equipment's bookings and
//! the delay cascade that pushes queued borrowers back when an urgent,
//! resumed or renewed borrow claims their slot.
//!
//! ## Cascade
//!
//! A queued record is one that is neither checked out nor deleted. When a
//! cascading borrow `[start, end]` is applied, queued records of the same
//! equipment are visited in `(start, id)` order, beginning with the
//! earliest one whose start or end lies inside `[start, end]`. A visited
//! record that starts before the running end is moved to the next working
//! instant at or after it and keeps its expected hours. The running end
//! starts at `end` and only grows.
//!
//! The policy never mutates anything: it returns a [`BorrowPlan`] that the
//! session commits in a single change set.

use crate::calendar::WorkCalendar;
use crate::equipment::Equipment;
use crate::money::Money;
use crate::worktime::WorkHours;
use crate::{EquipmentId, LabError, RecordId, Result, UserId};
use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

// =============================================================================
// TYPES
// =============================================================================

/// Kind of borrow application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BorrowKind {
    Normal,
    Urgent,
    ResumeInterrupted,
    Renewal,
}

impl BorrowKind {
    /// Whether applying this kind pushes queued borrowers back.
    #[must_use]
    pub fn cascades(self) -> bool {
        !matches!(self, Self::Normal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Approval {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReturnStatus {
    #[default]
    NotReturned,
    PendingConfirm,
    Returned,
}

/// A reservation of one piece of equipment by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRecord {
    pub id: RecordId,
    pub user: UserId,
    pub project: Option<String>,
    pub section: Option<String>,
    pub equipment_id: EquipmentId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub kind: BorrowKind,
    pub approval: Approval,
    pub refuse_reason: Option<String>,
    /// Checked out (the equipment has been handed over).
    pub borrowed: bool,
    pub interrupted: bool,
    /// An interrupted record whose remaining hours were claimed by a
    /// resume application.
    pub interrupt_resumed: bool,
    pub actual_end: Option<NaiveDateTime>,
    pub expected_hours: WorkHours,
    pub actual_hours: WorkHours,
    /// Snapshot of the equipment price at application time.
    pub per_hour_price: Option<Money>,
    pub total_amount: Option<Money>,
    pub final_reminded: bool,
    pub overtime_reminded: bool,
    pub return_status: ReturnStatus,
    pub deleted: bool,
    pub remarks: Option<String>,
    pub created_at: NaiveDateTime,
}

impl BorrowRecord {
    /// Waiting for its slot: not checked out and not deleted.
    #[must_use]
    pub fn is_queued(&self) -> bool {
        !self.borrowed && !self.deleted
    }

    /// Expected hours not yet consumed.
    #[must_use]
    pub fn remaining_hours(&self) -> WorkHours {
        self.expected_hours.saturating_sub(self.actual_hours)
    }

    pub fn approve(&mut self) -> Result<()> {
        self.ensure_pending("approve")?;
        self.approval = Approval::Approved;
        Ok(())
    }

    pub fn reject(&mut self, reason: Option<String>) -> Result<()> {
        self.ensure_pending("reject")?;
        self.approval = Approval::Rejected;
        self.refuse_reason = reason;
        Ok(())
    }

    /// Hand the equipment over.
    pub fn check_out(&mut self) -> Result<()> {
        if self.deleted || self.borrowed || self.approval != Approval::Approved {
            return Err(self.transition_error("check out"));
        }
        self.borrowed = true;
        Ok(())
    }

    /// Soft delete. Checked-out records cannot be cancelled.
    pub fn cancel(&mut self) -> Result<()> {
        if self.deleted || self.borrowed {
            return Err(self.transition_error("cancel"));
        }
        self.deleted = true;
        Ok(())
    }

    fn ensure_pending(&self, action: &str) -> Result<()> {
        if self.deleted || self.approval != Approval::Pending {
            return Err(self.transition_error(action));
        }
        Ok(())
    }

    fn transition_error(&self, action: &str) -> LabError {
        LabError::InvalidTransition(format!(
            "cannot {} borrow {} (approval {:?}, checked out {}, deleted {})",
            action, self.id, self.approval, self.borrowed, self.deleted
        ))
    }
}

/// A borrow application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRequest {
    pub user: UserId,
    #[serde(default)]
    pub project: Option<String>,
    /// Department billed for the borrow.
    #[serde(default)]
    pub section: Option<String>,
    pub equipment_id: EquipmentId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub kind: BorrowKind,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Bounds a new application must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowWindow {
    pub earliest_start: NaiveDateTime,
    pub latest_end: Option<NaiveDateTime>,
}

/// New slot of a queued record pushed back by the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delay {
    pub record: RecordId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Everything needed to commit a validated application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowPlan {
    pub expected_hours: WorkHours,
    pub delays: Vec<Delay>,
    /// Interrupted record to mark as resumed.
    pub resumes: Option<RecordId>,
    pub per_hour_price: Option<Money>,
}

impl BorrowPlan {
    /// The record created by this plan.
    #[must_use]
    pub fn record(&self, id: RecordId, request: BorrowRequest, created_at: NaiveDateTime) -> BorrowRecord {
        BorrowRecord {
            id,
            user: request.user,
            project: request.project,
            section: request.section,
            equipment_id: request.equipment_id,
            start: request.start,
            end: request.end,
            kind: request.kind,
            approval: Approval::Pending,
            refuse_reason: None,
            borrowed: false,
            interrupted: false,
            interrupt_resumed: false,
            actual_end: None,
            expected_hours: self.expected_hours,
            actual_hours: WorkHours::ZERO,
            per_hour_price: self.per_hour_price,
            total_amount: None,
            final_reminded: false,
            overtime_reminded: false,
            return_status: ReturnStatus::NotReturned,
            deleted: false,
            remarks: request.remarks,
            created_at,
        }
    }
}

/// The approved, queued borrower of `equipment` to notify once it frees up
/// at `from`. Earliest application wins.
#[must_use]
pub fn next_borrower<'r>(
    records: &'r [BorrowRecord],
    equipment: &EquipmentId,
    from: NaiveDateTime,
) -> Option<&'r BorrowRecord> {
    records
        .iter()
        .filter(|r| {
            r.equipment_id == *equipment
                && r.is_queued()
                && r.approval == Approval::Approved
                && r.start >= from
        })
        .min_by_key(|r| r.id)
}

// =============================================================================
// POLICY
// =============================================================================

/// Borrow rules evaluated on a calendar.
#[derive(Debug, Clone, Copy)]
pub struct BorrowPolicy<'a> {
    calendar: &'a WorkCalendar,
}

impl<'a> BorrowPolicy<'a> {
    #[must_use]
    pub fn new(calendar: &'a WorkCalendar) -> Self {
        Self { calendar }
    }

    /// Latest end among the equipment's non-deleted bookings.
    #[must_use]
    pub fn latest_booked_end(records: &[BorrowRecord], equipment: &EquipmentId) -> Option<NaiveDateTime> {
        records
            .iter()
            .filter(|r| !r.deleted && r.equipment_id == *equipment)
            .map(|r| r.end)
            .max()
    }

    /// The user's most recent interrupted record that has not been resumed.
    #[must_use]
    pub fn interrupted_record(records: &[BorrowRecord], user: UserId) -> Option<&BorrowRecord> {
        records
            .iter()
            .filter(|r| !r.deleted && r.user == user && r.interrupted && !r.interrupt_resumed)
            .max_by_key(|r| r.id)
    }

    /// The window a new application of `kind` may use, as seen at `now`.
    pub fn allowed_window(
        &self,
        equipment: &Equipment,
        records: &[BorrowRecord],
        user: UserId,
        kind: BorrowKind,
        now: NaiveDateTime,
    ) -> Result<BorrowWindow> {
        equipment.ensure_borrowable()?;
        let mut earliest = now
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .ok_or(LabError::DateOutOfRange)?;
        if kind == BorrowKind::Normal {
            if let Some(latest) = Self::latest_booked_end(records, &equipment.id) {
                earliest = earliest.max(latest);
            }
        }

        let latest_end = match kind {
            BorrowKind::ResumeInterrupted => {
                let record = Self::interrupted_record(records, user)
                    .ok_or(LabError::NoInterruptedBorrow)?;
                let remaining = record.remaining_hours();
                if remaining.is_positive() {
                    Some(self.calendar.end_time_for(earliest, remaining)?)
                } else {
                    Some(earliest)
                }
            }
            _ => match equipment.allow_borrow_days {
                Some(days) => Some(days_after(earliest, days)?),
                None => None,
            },
        };

        Ok(BorrowWindow {
            earliest_start: earliest,
            latest_end,
        })
    }

    /// Validate an application and work out its side effects.
    pub fn plan(
        &self,
        equipment: &Equipment,
        records: &[BorrowRecord],
        request: &BorrowRequest,
    ) -> Result<BorrowPlan> {
        let (start, end) = (request.start, request.end);
        if end <= start {
            return Err(LabError::InvalidWindow { start, end });
        }
        equipment.ensure_borrowable()?;

        let mut resumes = None;
        match request.kind {
            BorrowKind::Normal => {
                if let Some(latest) = Self::latest_booked_end(records, &equipment.id) {
                    if latest > start {
                        return Err(LabError::StartTooEarly { earliest: latest });
                    }
                }
                if let Some(days) = equipment.allow_borrow_days {
                    let latest = days_after(start, days)?;
                    if end > latest {
                        return Err(LabError::EndTooLate { latest });
                    }
                }
            }
            BorrowKind::ResumeInterrupted => {
                let record = Self::interrupted_record(records, request.user)
                    .ok_or(LabError::NoInterruptedBorrow)?;
                let remaining = record.remaining_hours();
                if !remaining.is_positive() {
                    return Err(LabError::NoRemainingHours);
                }
                let latest = self.calendar.end_time_for(start, remaining)?;
                if end > latest {
                    return Err(LabError::EndTooLate { latest });
                }
                resumes = Some(record.id);
            }
            BorrowKind::Urgent | BorrowKind::Renewal => {}
        }

        let expected_hours = self.calendar.work_hours_between(start, end)?;
        let delays = if request.kind.cascades() {
            self.cascade(records, &equipment.id, start, end)?
        } else {
            Vec::new()
        };

        Ok(BorrowPlan {
            expected_hours,
            delays,
            resumes,
            per_hour_price: equipment.per_hour_price,
        })
    }

    /// Delays caused by claiming `[start, end]` on `equipment`.
    pub fn cascade(
        &self,
        records: &[BorrowRecord],
        equipment: &EquipmentId,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Delay>> {
        let mut queued: Vec<&BorrowRecord> = records
            .iter()
            .filter(|r| r.equipment_id == *equipment && r.is_queued())
            .collect();
        queued.sort_by_key(|r| (r.start, r.id));

        let inside = |t: NaiveDateTime| start <= t && t <= end;
        let Some(from) = queued
            .iter()
            .filter(|r| inside(r.start) || inside(r.end))
            .map(|r| r.start)
            .min()
        else {
            return Ok(Vec::new());
        };

        let mut delays = Vec::new();
        let mut running = end;
        for record in queued.into_iter().filter(|r| r.start >= from) {
            if record.start < running {
                let new_start = self.calendar.clamp_forward(running)?;
                let new_end = self.calendar.end_time_for(new_start, record.expected_hours)?;
                delays.push(Delay {
                    record: record.id,
                    start: new_start,
                    end: new_end,
                });
                running = running.max(new_end);
            } else {
                running = running.max(record.end);
            }
        }
        Ok(delays)
    }

    /// Move a record to a new window and recompute its expected hours.
    pub fn reschedule(
        &self,
        record: &mut BorrowRecord,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<()> {
        if end <= start {
            return Err(LabError::InvalidWindow { start, end });
        }
        if record.deleted || record.return_status == ReturnStatus::Returned {
            return Err(record.transition_error("reschedule"));
        }
        record.expected_hours = self.calendar.work_hours_between(start, end)?;
        record.start = start;
        record.end = end;
        Ok(())
    }
}

fn days_after(t: NaiveDateTime, days: u32) -> Result<NaiveDateTime> {
    t.checked_add_signed(Duration::days(i64::from(days)))
        .ok_or(LabError::DateOutOfRange)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::equipment::EquipmentState;
    use chrono::NaiveDate;

    pub(crate) fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    pub(crate) fn booking(
        id: u64,
        equipment: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> BorrowRecord {
        let cal = WorkCalendar::default();
        let request = BorrowRequest {
            user: UserId(id),
            project: None,
            section: None,
            equipment_id: EquipmentId::new(equipment),
            start,
            end,
            kind: BorrowKind::Normal,
            remarks: None,
        };
        BorrowPlan {
            expected_hours: cal.work_hours_between(start, end).unwrap(),
            delays: Vec::new(),
            resumes: None,
            per_hour_price: None,
        }
        .record(RecordId(id), request, at(2025, 3, 1, 8, 0))
    }

    fn request(kind: BorrowKind, start: NaiveDateTime, end: NaiveDateTime) -> BorrowRequest {
        BorrowRequest {
            user: UserId(42),
            project: Some("P-100".into()),
            section: None,
            equipment_id: EquipmentId::new("EQ-1"),
            start,
            end,
            kind,
            remarks: None,
        }
    }

    #[test]
    fn window_starts_at_now_truncated_to_the_minute() {
        let cal = WorkCalendar::default();
        let policy = BorrowPolicy::new(&cal);
        let eq = Equipment::new("EQ-1", "Scope");
        let now = at(2025, 3, 10, 10, 15) + Duration::seconds(42);
        let window = policy
            .allowed_window(&eq, &[], UserId(1), BorrowKind::Urgent, now)
            .unwrap();
        assert_eq!(window.earliest_start, at(2025, 3, 10, 10, 15));
        assert_eq!(window.latest_end, None);
    }

    #[test]
    fn huge_day_limit_is_out_of_range() {
        let cal = WorkCalendar::default();
        let policy = BorrowPolicy::new(&cal);
        let eq = Equipment::new("EQ-1", "Scope").with_allow_borrow_days(u32::MAX);
        let now = at(2025, 3, 10, 10, 0);
        let err = policy
            .allowed_window(&eq, &[], UserId(1), BorrowKind::Urgent, now)
            .unwrap_err();
        assert!(matches!(err, LabError::DateOutOfRange));

        let normal = request(BorrowKind::Normal, at(2025, 3, 10, 9, 0), at(2025, 3, 10, 12, 0));
        let err = policy.plan(&eq, &[], &normal).unwrap_err();
        assert!(matches!(err, LabError::DateOutOfRange));
    }

    #[test]
    fn normal_window_follows_latest_booking_and_day_limit() {
        let cal = WorkCalendar::default();
        let policy = BorrowPolicy::new(&cal);
        let eq = Equipment::new("EQ-1", "Scope").with_allow_borrow_days(3);
        let records = vec![booking(1, "EQ-1", at(2025, 3, 11, 9, 0), at(2025, 3, 12, 18, 0))];
        let window = policy
            .allowed_window(&eq, &records, UserId(1), BorrowKind::Normal, at(2025, 3, 10, 10, 0))
            .unwrap();
        assert_eq!(window.earliest_start, at(2025, 3, 12, 18, 0));
        assert_eq!(window.latest_end, Some(at(2025, 3, 15, 18, 0)));
    }

    #[test]
    fn resume_window_is_bounded_by_remaining_hours() {
        let cal = WorkCalendar::default();
        let policy = BorrowPolicy::new(&cal);
        let eq = Equipment::new("EQ-1", "Scope");
        let mut old = booking(5, "EQ-1", at(2025, 3, 3, 9, 0), at(2025, 3, 4, 19, 0));
        old.user = UserId(42);
        old.interrupted = true;
        old.actual_hours = WorkHours::from_hours(15);

        let window = policy
            .allowed_window(&eq, &[old], UserId(42), BorrowKind::ResumeInterrupted, at(2025, 3, 14, 17, 0))
            .unwrap();
        // 5h left: 2h Friday, 3h Monday.
        assert_eq!(window.latest_end, Some(at(2025, 3, 17, 12, 0)));

        let err = policy
            .allowed_window(&eq, &[], UserId(42), BorrowKind::ResumeInterrupted, at(2025, 3, 14, 17, 0))
            .unwrap_err();
        assert_eq!(err, LabError::NoInterruptedBorrow);
    }

    #[test]
    fn plan_rejects_unavailable_equipment_and_empty_windows() {
        let cal = WorkCalendar::default();
        let policy = BorrowPolicy::new(&cal);
        let eq = Equipment::new("EQ-1", "Scope").with_state(EquipmentState::Maintenance);
        let req = request(BorrowKind::Normal, at(2025, 3, 10, 9, 0), at(2025, 3, 10, 12, 0));
        assert!(matches!(
            policy.plan(&eq, &[], &req),
            Err(LabError::EquipmentUnavailable { .. })
        ));

        let eq = Equipment::new("EQ-1", "Scope");
        let req = request(BorrowKind::Normal, at(2025, 3, 10, 12, 0), at(2025, 3, 10, 12, 0));
        assert!(matches!(
            policy.plan(&eq, &[], &req),
            Err(LabError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn normal_plan_enforces_queue_and_day_limit() {
        let cal = WorkCalendar::default();
        let policy = BorrowPolicy::new(&cal);
        let eq = Equipment::new("EQ-1", "Scope")
            .with_allow_borrow_days(2)
            .with_price("10.00".parse().unwrap());
        let records = vec![booking(1, "EQ-1", at(2025, 3, 10, 9, 0), at(2025, 3, 10, 14, 0))];

        let early = request(BorrowKind::Normal, at(2025, 3, 10, 13, 0), at(2025, 3, 10, 16, 0));
        assert_eq!(
            policy.plan(&eq, &records, &early).unwrap_err(),
            LabError::StartTooEarly {
                earliest: at(2025, 3, 10, 14, 0)
            }
        );

        let long = request(BorrowKind::Normal, at(2025, 3, 10, 14, 0), at(2025, 3, 13, 9, 0));
        assert_eq!(
            policy.plan(&eq, &records, &long).unwrap_err(),
            LabError::EndTooLate {
                latest: at(2025, 3, 12, 14, 0)
            }
        );

        let ok = request(BorrowKind::Normal, at(2025, 3, 10, 14, 0), at(2025, 3, 11, 11, 0));
        let plan = policy.plan(&eq, &records, &ok).unwrap();
        assert_eq!(plan.expected_hours, WorkHours::from_hours(7));
        assert!(plan.delays.is_empty());
        assert_eq!(plan.per_hour_price, Some(Money::from_cents(1000)));
    }

    #[test]
    fn resume_plan_claims_the_interrupted_record() {
        let cal = WorkCalendar::default();
        let policy = BorrowPolicy::new(&cal);
        let eq = Equipment::new("EQ-1", "Scope");
        let mut old = booking(5, "EQ-1", at(2025, 3, 3, 9, 0), at(2025, 3, 3, 19, 0));
        old.user = UserId(42);
        old.borrowed = true;
        old.interrupted = true;
        old.actual_hours = WorkHours::from_hours(6);

        let too_long = request(BorrowKind::ResumeInterrupted, at(2025, 3, 10, 9, 0), at(2025, 3, 10, 14, 0));
        assert_eq!(
            policy.plan(&eq, std::slice::from_ref(&old), &too_long).unwrap_err(),
            LabError::EndTooLate {
                latest: at(2025, 3, 10, 13, 0)
            }
        );

        let fits = request(BorrowKind::ResumeInterrupted, at(2025, 3, 10, 9, 0), at(2025, 3, 10, 13, 0));
        let plan = policy.plan(&eq, std::slice::from_ref(&old), &fits).unwrap();
        assert_eq!(plan.resumes, Some(RecordId(5)));

        old.actual_hours = WorkHours::from_hours(10);
        assert_eq!(
            policy.plan(&eq, &[old], &fits).unwrap_err(),
            LabError::NoRemainingHours
        );
    }

    #[test]
    fn urgent_borrow_pushes_the_queue_back() {
        let cal = WorkCalendar::default();
        let policy = BorrowPolicy::new(&cal);
        let eq = Equipment::new("EQ-1", "Scope");
        let records = vec![
            booking(1, "EQ-1", at(2025, 3, 10, 10, 0), at(2025, 3, 10, 14, 0)),
            booking(2, "EQ-1", at(2025, 3, 10, 14, 0), at(2025, 3, 10, 18, 0)),
            booking(3, "EQ-1", at(2025, 3, 12, 9, 0), at(2025, 3, 12, 12, 0)),
            booking(4, "EQ-2", at(2025, 3, 10, 10, 0), at(2025, 3, 10, 12, 0)),
        ];
        let urgent = request(BorrowKind::Urgent, at(2025, 3, 10, 9, 0), at(2025, 3, 10, 12, 0));
        let plan = policy.plan(&eq, &records, &urgent).unwrap();

        assert_eq!(
            plan.delays,
            vec![
                Delay {
                    record: RecordId(1),
                    start: at(2025, 3, 10, 12, 0),
                    end: at(2025, 3, 10, 16, 0),
                },
                // 3h Monday evening, 1h Tuesday morning.
                Delay {
                    record: RecordId(2),
                    start: at(2025, 3, 10, 16, 0),
                    end: at(2025, 3, 11, 10, 0),
                },
            ]
        );
    }

    #[test]
    fn cascade_skips_checked_out_and_deleted_records() {
        let cal = WorkCalendar::default();
        let policy = BorrowPolicy::new(&cal);
        let mut out = booking(1, "EQ-1", at(2025, 3, 10, 10, 0), at(2025, 3, 10, 12, 0));
        out.borrowed = true;
        let mut gone = booking(2, "EQ-1", at(2025, 3, 10, 11, 0), at(2025, 3, 10, 13, 0));
        gone.deleted = true;
        let delays = policy
            .cascade(&[out, gone], &EquipmentId::new("EQ-1"), at(2025, 3, 10, 9, 0), at(2025, 3, 10, 15, 0))
            .unwrap();
        assert!(delays.is_empty());
    }

    #[test]
    fn delayed_start_after_closing_moves_to_next_workday() {
        let cal = WorkCalendar::default();
        let policy = BorrowPolicy::new(&cal);
        let records = vec![booking(1, "EQ-1", at(2025, 3, 14, 18, 0), at(2025, 3, 14, 19, 0))];
        let delays = policy
            .cascade(&records, &EquipmentId::new("EQ-1"), at(2025, 3, 14, 17, 0), at(2025, 3, 14, 19, 0))
            .unwrap();
        assert_eq!(delays.len(), 1);
        assert_eq!(delays[0].start, at(2025, 3, 17, 9, 0));
        assert_eq!(delays[0].end, at(2025, 3, 17, 10, 0));
    }

    #[test]
    fn next_borrower_is_first_approved_application() {
        let mut a = booking(3, "EQ-1", at(2025, 3, 11, 9, 0), at(2025, 3, 11, 12, 0));
        let mut b = booking(2, "EQ-1", at(2025, 3, 12, 9, 0), at(2025, 3, 12, 12, 0));
        let c = booking(1, "EQ-1", at(2025, 3, 11, 13, 0), at(2025, 3, 11, 15, 0));
        a.approval = Approval::Approved;
        b.approval = Approval::Approved;
        let records = vec![a, b, c];
        let next = next_borrower(&records, &EquipmentId::new("EQ-1"), at(2025, 3, 10, 19, 0));
        assert_eq!(next.map(|r| r.id), Some(RecordId(2)));
        assert!(next_borrower(&records, &EquipmentId::new("EQ-1"), at(2025, 3, 13, 9, 0)).is_none());
    }

    #[test]
    fn record_transitions() {
        let mut record = booking(1, "EQ-1", at(2025, 3, 10, 9, 0), at(2025, 3, 10, 12, 0));
        assert!(record.check_out().is_err());
        record.approve().unwrap();
        assert!(record.reject(None).is_err());
        record.check_out().unwrap();
        assert!(record.cancel().is_err());

        let mut other = booking(2, "EQ-1", at(2025, 3, 10, 9, 0), at(2025, 3, 10, 12, 0));
        other.reject(Some("calibration week".into())).unwrap();
        assert_eq!(other.approval, Approval::Rejected);
        other.cancel().unwrap();
        assert!(!other.is_queued());
    }

    #[test]
    fn reschedule_recomputes_expected_hours() {
        let cal = WorkCalendar::default();
        let policy = BorrowPolicy::new(&cal);
        let mut record = booking(1, "EQ-1", at(2025, 3, 10, 9, 0), at(2025, 3, 10, 12, 0));
        policy
            .reschedule(&mut record, at(2025, 3, 14, 17, 0), at(2025, 3, 17, 11, 0))
            .unwrap();
        assert_eq!(record.expected_hours, WorkHours::from_hours(4));
        assert!(policy
            .reschedule(&mut record, at(2025, 3, 17, 11, 0), at(2025, 3, 14, 17, 0))
            .is_err());
    }
}
