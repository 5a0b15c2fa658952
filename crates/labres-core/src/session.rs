//! # Session
//!
//! A [`LabStore`] bound to a [`WorkCalendar`]. Each public operation reads
//! what it needs, runs the pure rules from the other modules and writes
//! the outcome with a single [`LabStore::commit`].

use crate::borrow::{BorrowKind, BorrowPolicy, BorrowRecord, BorrowRequest, BorrowWindow, Delay};
use crate::calendar::WorkCalendar;
use crate::calibration::{
    CalibrationInfo, CalibrationInput, MaintainInfo, MaintainInput, MaintenanceRecord,
};
use crate::equipment::{Equipment, EquipmentState};
use crate::foundry::{FoundryAsset, FoundryAssetInput, FoundryTransfer, TransferRequest, plan_transfer};
use crate::money::{Currency, ExchangeRate, refresh_rates};
use crate::period::Period;
use crate::reminder::{ReturnReminder, due_reminders};
use crate::report::{FeeFilter, FeeReport, MaintenanceTimeReport};
use crate::settlement::{self, ConfirmState, ReturnApplication, ReturnRequest, Settlement};
use crate::storage::{ChangeSet, LabStore, MemoryStore, Sequence};
use crate::usage::UsageReport;
use crate::{EquipmentId, LabError, RecordId, Result, UserId};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stored borrow and the queued records it pushed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowOutcome {
    pub record: BorrowRecord,
    pub delays: Vec<Delay>,
}

/// Repair report that puts a piece of equipment back in service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub equipment_id: EquipmentId,
    pub down_time: NaiveDateTime,
    pub up_time: NaiveDateTime,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub maintainer: Option<String>,
}

/// A stored transfer and the asset records it wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub transfer: FoundryTransfer,
    pub source: FoundryAsset,
    pub split: Option<FoundryAsset>,
}

#[derive(Debug)]
pub struct Session<S: LabStore = MemoryStore> {
    store: S,
    calendar: WorkCalendar,
}

impl Session<MemoryStore> {
    #[must_use]
    pub fn in_memory(calendar: WorkCalendar) -> Self {
        Self::new(MemoryStore::new(), calendar)
    }
}

impl<S: LabStore> Session<S> {
    pub fn new(store: S, calendar: WorkCalendar) -> Self {
        Self { store, calendar }
    }

    #[must_use]
    pub fn calendar(&self) -> &WorkCalendar {
        &self.calendar
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    fn policy(&self) -> BorrowPolicy<'_> {
        BorrowPolicy::new(&self.calendar)
    }

    // =========================================================================
    // EQUIPMENT
    // =========================================================================

    pub fn register_equipment(&mut self, equipment: Equipment) -> Result<()> {
        if self.store.equipment(&equipment.id)?.is_some() {
            return Err(LabError::AlreadyExists {
                kind: "equipment",
                id: equipment.id.to_string(),
            });
        }
        self.commit_one(|c| c.equipment.push(equipment))
    }

    pub fn equipment(&self, id: &EquipmentId) -> Result<Equipment> {
        self.store
            .equipment(id)?
            .ok_or_else(|| LabError::not_found("equipment", id))
    }

    pub fn all_equipment(&self) -> Result<Vec<Equipment>> {
        self.store.all_equipment()
    }

    // =========================================================================
    // BORROWS
    // =========================================================================

    pub fn allowed_window(
        &self,
        equipment: &EquipmentId,
        user: UserId,
        kind: BorrowKind,
        now: NaiveDateTime,
    ) -> Result<BorrowWindow> {
        let eq = self.equipment(equipment)?;
        let records = self.store.borrows()?;
        self.policy().allowed_window(&eq, &records, user, kind, now)
    }

    /// Validate and store an application together with the delays it
    /// causes and the resumed interrupted record.
    pub fn apply_borrow(&mut self, request: BorrowRequest, now: NaiveDateTime) -> Result<BorrowOutcome> {
        let eq = self.equipment(&request.equipment_id)?;
        let records = self.store.borrows()?;
        let plan = self.policy().plan(&eq, &records, &request)?;

        let id = self.store.allocate_id(Sequence::Borrow)?;
        let record = plan.record(id, request, now);

        let mut changes = ChangeSet::new();
        let by_id: BTreeMap<RecordId, &BorrowRecord> = records.iter().map(|r| (r.id, r)).collect();
        for delay in &plan.delays {
            if let Some(old) = by_id.get(&delay.record) {
                let mut moved = (*old).clone();
                moved.start = delay.start;
                moved.end = delay.end;
                changes.borrows.push(moved);
            }
        }
        if let Some(resumed) = plan.resumes.and_then(|rid| by_id.get(&rid)) {
            let mut resumed = (*resumed).clone();
            resumed.interrupt_resumed = true;
            changes.borrows.push(resumed);
        }
        changes.borrows.push(record.clone());
        self.store.commit(changes)?;

        Ok(BorrowOutcome {
            record,
            delays: plan.delays,
        })
    }

    pub fn borrow(&self, id: RecordId) -> Result<BorrowRecord> {
        self.store
            .borrow(id)?
            .ok_or_else(|| LabError::not_found("borrow", id))
    }

    /// Non-deleted borrows of one piece of equipment ordered by start.
    pub fn borrows_for(&self, equipment: &EquipmentId) -> Result<Vec<BorrowRecord>> {
        let mut records: Vec<_> = self
            .store
            .borrows()?
            .into_iter()
            .filter(|r| !r.deleted && r.equipment_id == *equipment)
            .collect();
        records.sort_by_key(|r| (r.start, r.id));
        Ok(records)
    }

    pub fn reschedule(
        &mut self,
        id: RecordId,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<BorrowRecord> {
        let mut record = self.borrow(id)?;
        self.policy().reschedule(&mut record, start, end)?;
        self.save_borrow(record)
    }

    pub fn approve(&mut self, id: RecordId) -> Result<BorrowRecord> {
        let mut record = self.borrow(id)?;
        record.approve()?;
        self.save_borrow(record)
    }

    pub fn reject(&mut self, id: RecordId, reason: Option<String>) -> Result<BorrowRecord> {
        let mut record = self.borrow(id)?;
        record.reject(reason)?;
        self.save_borrow(record)
    }

    pub fn cancel(&mut self, id: RecordId) -> Result<BorrowRecord> {
        let mut record = self.borrow(id)?;
        record.cancel()?;
        self.save_borrow(record)
    }

    /// Hand the equipment over; it becomes [`EquipmentState::InUse`].
    pub fn check_out(&mut self, id: RecordId) -> Result<BorrowRecord> {
        let mut record = self.borrow(id)?;
        let mut eq = self.equipment(&record.equipment_id)?;
        eq.ensure_borrowable()?;
        record.check_out()?;
        eq.state = EquipmentState::InUse;

        let mut changes = ChangeSet::new();
        changes.equipment.push(eq);
        changes.borrows.push(record.clone());
        self.store.commit(changes)?;
        Ok(record)
    }

    fn save_borrow(&mut self, record: BorrowRecord) -> Result<BorrowRecord> {
        let saved = record.clone();
        self.commit_one(|c| c.borrows.push(record))?;
        Ok(saved)
    }

    // =========================================================================
    // RETURNS
    // =========================================================================

    pub fn request_return(
        &mut self,
        request: ReturnRequest,
        now: NaiveDateTime,
    ) -> Result<ReturnApplication> {
        let mut record = self.borrow(request.borrow)?;
        let existing = self.store.return_application(record.id)?;
        let application = settlement::request_return(&mut record, existing.as_ref(), request, now)?;

        let mut changes = ChangeSet::new();
        changes.borrows.push(record);
        changes.returns.push(application.clone());
        self.store.commit(changes)?;
        Ok(application)
    }

    pub fn confirm_return(&mut self, borrow: RecordId, state: ConfirmState) -> Result<Settlement> {
        let mut record = self.borrow(borrow)?;
        let mut application = self
            .store
            .return_application(borrow)?
            .ok_or_else(|| LabError::not_found("return application", borrow))?;
        let mut eq = self.equipment(&record.equipment_id)?;
        let queue = self.borrows_for(&record.equipment_id)?;

        let settled = settlement::confirm_return(
            &self.calendar,
            &mut record,
            &mut application,
            &mut eq,
            state,
            &queue,
        )?;

        let mut changes = ChangeSet::new();
        changes.borrows.push(record);
        changes.returns.push(application);
        changes.equipment.push(eq);
        self.store.commit(changes)?;
        Ok(settled)
    }

    // =========================================================================
    // UPKEEP
    // =========================================================================

    /// Create or replace the calibration of a piece of equipment and apply
    /// the equipment state change it implies.
    pub fn upsert_calibration(
        &mut self,
        input: CalibrationInput,
        today: NaiveDate,
    ) -> Result<CalibrationInfo> {
        let mut eq = self.equipment(&input.equipment_id)?;
        let id = match self.store.calibration_for(&input.equipment_id)? {
            Some(existing) => existing.id,
            None => self.store.allocate_id(Sequence::Calibration)?,
        };
        let info = input.into_info(id, today)?;

        let mut changes = ChangeSet::new();
        if let Some(state) = info.state.equipment_transition(eq.state) {
            eq.state = state;
            changes.equipment.push(eq);
        }
        changes.calibrations.push(info.clone());
        self.store.commit(changes)?;
        Ok(info)
    }

    /// Recompute every due status. Returns how many calibrations changed.
    pub fn refresh_calibrations(&mut self, today: NaiveDate) -> Result<usize> {
        let mut changes = ChangeSet::new();
        for mut info in self.store.calibrations()? {
            if info.refresh(today) {
                changes.calibrations.push(info);
            }
        }
        let changed = changes.calibrations.len();
        self.store.commit(changes)?;
        Ok(changed)
    }

    pub fn upsert_maintain(&mut self, input: MaintainInput, today: NaiveDate) -> Result<MaintainInfo> {
        self.equipment(&input.equipment_id)?;
        let id = match self.store.maintain_for(&input.equipment_id)? {
            Some(existing) => existing.id,
            None => self.store.allocate_id(Sequence::Maintain)?,
        };
        let info = input.into_info(id, today)?;
        let saved = info.clone();
        self.commit_one(|c| c.maintains.push(info))?;
        Ok(saved)
    }

    /// Record a repair and put the equipment back to available.
    pub fn complete_maintenance(&mut self, report: MaintenanceReport) -> Result<MaintenanceRecord> {
        if report.up_time < report.down_time {
            return Err(LabError::InvalidWindow {
                start: report.down_time,
                end: report.up_time,
            });
        }
        let mut eq = self.equipment(&report.equipment_id)?;
        let id = self.store.allocate_id(Sequence::Maintenance)?;
        let record = MaintenanceRecord {
            id,
            equipment_id: report.equipment_id,
            down_time: report.down_time,
            up_time: report.up_time,
            reason: report.reason,
            maintainer: report.maintainer,
        };
        eq.state = EquipmentState::Available;

        let mut changes = ChangeSet::new();
        changes.equipment.push(eq);
        changes.maintenance.push(record.clone());
        self.store.commit(changes)?;
        Ok(record)
    }

    // =========================================================================
    // REMINDERS AND REPORTS
    // =========================================================================

    /// Reminders due at `now`. Each one is flagged so it fires only once.
    pub fn remind_returns(&mut self, now: NaiveDateTime, lead: Duration) -> Result<Vec<ReturnReminder>> {
        let records = self.store.borrows()?;
        let reminders = due_reminders(&records, now, lead);
        if reminders.is_empty() {
            return Ok(reminders);
        }

        let mut by_id: BTreeMap<RecordId, BorrowRecord> =
            records.into_iter().map(|r| (r.id, r)).collect();
        let mut changes = ChangeSet::new();
        for reminder in &reminders {
            if let Some(mut record) = by_id.remove(&reminder.record()) {
                reminder.mark(&mut record);
                changes.borrows.push(record);
            }
        }
        self.store.commit(changes)?;
        Ok(reminders)
    }

    pub fn usage_report(&self, window: Period) -> Result<UsageReport> {
        let records = self.store.borrows()?;
        UsageReport::build(&self.calendar, &records, window)
    }

    /// Repair hours per piece of equipment, optionally for one maintainer.
    pub fn maintenance_time_report(
        &self,
        window: Period,
        maintainer: Option<&str>,
    ) -> Result<MaintenanceTimeReport> {
        let records = self.store.maintenance_records()?;
        MaintenanceTimeReport::build(&self.calendar, &records, window, maintainer)
    }

    pub fn fee_report(&self, window: Period, filter: &FeeFilter) -> Result<FeeReport> {
        let records = self.store.borrows()?;
        FeeReport::build(&self.calendar, &records, window, filter)
    }

    pub fn maintenance_records(&self) -> Result<Vec<MaintenanceRecord>> {
        self.store.maintenance_records()
    }

    pub fn calibrations(&self) -> Result<Vec<CalibrationInfo>> {
        self.store.calibrations()
    }

    // =========================================================================
    // CURRENCIES
    // =========================================================================

    /// Create or update a currency, matched by short name.
    pub fn upsert_currency(
        &mut self,
        name: &str,
        short_name: &str,
        rate: Option<ExchangeRate>,
        now: NaiveDateTime,
    ) -> Result<Currency> {
        let existing = self
            .store
            .currencies()?
            .into_iter()
            .find(|c| c.short_name == short_name);
        let id = match &existing {
            Some(c) => c.id,
            None => self.store.allocate_id(Sequence::Currency)?,
        };
        let currency = Currency {
            id,
            name: name.to_string(),
            short_name: short_name.to_string(),
            exchange_rate: rate.or(existing.as_ref().and_then(|c| c.exchange_rate)),
            updated_at: if rate.is_some() {
                Some(now)
            } else {
                existing.and_then(|c| c.updated_at)
            },
        };
        let saved = currency.clone();
        self.commit_one(|c| c.currencies.push(currency))?;
        Ok(saved)
    }

    pub fn currencies(&self) -> Result<Vec<Currency>> {
        self.store.currencies()
    }

    pub fn currency(&self, short_name: &str) -> Result<Currency> {
        self.store
            .currencies()?
            .into_iter()
            .find(|c| c.short_name == short_name)
            .ok_or_else(|| LabError::not_found("currency", short_name))
    }

    /// Apply a fetched rate table. Returns how many currencies changed.
    pub fn update_currency_rates(
        &mut self,
        rates: &BTreeMap<String, ExchangeRate>,
        now: NaiveDateTime,
    ) -> Result<usize> {
        let mut currencies = self.store.currencies()?;
        let changed = refresh_rates(&mut currencies, rates, now);
        let mut changes = ChangeSet::new();
        changes.currencies = currencies
            .into_iter()
            .filter(|c| c.updated_at == Some(now))
            .collect();
        self.store.commit(changes)?;
        Ok(changed)
    }

    // =========================================================================
    // FOUNDRY
    // =========================================================================

    /// Store a purchase priced at its currency's current rate.
    pub fn register_foundry_asset(&mut self, input: FoundryAssetInput) -> Result<FoundryAsset> {
        let rate = self.currency(&input.currency)?.exchange_rate;
        let id = self.store.allocate_id(Sequence::FoundryAsset)?;
        let asset = input.into_asset(id, rate)?;
        let saved = asset.clone();
        self.commit_one(|c| c.foundry_assets.push(asset))?;
        Ok(saved)
    }

    pub fn foundry_asset(&self, id: RecordId) -> Result<FoundryAsset> {
        self.store
            .foundry_asset(id)?
            .ok_or_else(|| LabError::not_found("foundry asset", id))
    }

    pub fn foundry_assets(&self) -> Result<Vec<FoundryAsset>> {
        self.store.foundry_assets()
    }

    pub fn foundry_transfers(&self) -> Result<Vec<FoundryTransfer>> {
        self.store.foundry_transfers()
    }

    /// Move stock to another factory or project. The asset records and the
    /// log entry are written together.
    pub fn foundry_transfer(
        &mut self,
        request: TransferRequest,
        now: NaiveDateTime,
    ) -> Result<TransferOutcome> {
        let asset = self.foundry_asset(request.asset)?;
        let rate = self.currency(&asset.currency)?.exchange_rate;
        let store = &mut self.store;
        let plan = plan_transfer(&asset, &request, rate, || {
            store.allocate_id(Sequence::FoundryAsset)
        })?;
        let log_id = self.store.allocate_id(Sequence::FoundryTransfer)?;
        let transfer = plan.log(log_id, &asset, &request, now);

        let mut changes = ChangeSet::new();
        changes.foundry_assets.push(plan.source.clone());
        changes.foundry_assets.extend(plan.split.clone());
        changes.foundry_transfers.push(transfer.clone());
        self.store.commit(changes)?;
        Ok(TransferOutcome {
            transfer,
            source: plan.source,
            split: plan.split,
        })
    }

    fn commit_one(&mut self, fill: impl FnOnce(&mut ChangeSet)) -> Result<()> {
        let mut changes = ChangeSet::new();
        fill(&mut changes);
        self.store.commit(changes)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::borrow::tests::at;
    use crate::borrow::{Approval, ReturnStatus};
    use crate::calibration::{CalibrationState, DueStatus};
    use crate::foundry::AssetKind;
    use crate::worktime::WorkHours;

    fn session() -> Session {
        let mut session = Session::in_memory(WorkCalendar::default());
        session
            .register_equipment(
                Equipment::new("EQ-1", "Oscilloscope").with_price("20.00".parse().unwrap()),
            )
            .unwrap();
        session
    }

    fn request(user: u64, kind: BorrowKind, start: NaiveDateTime, end: NaiveDateTime) -> BorrowRequest {
        BorrowRequest {
            user: UserId(user),
            project: None,
            section: None,
            equipment_id: EquipmentId::new("EQ-1"),
            start,
            end,
            kind,
            remarks: None,
        }
    }

    #[test]
    fn duplicate_equipment_is_rejected() {
        let mut s = session();
        let err = s
            .register_equipment(Equipment::new("EQ-1", "Other"))
            .unwrap_err();
        assert!(matches!(err, LabError::AlreadyExists { .. }));
        assert!(matches!(
            s.equipment(&EquipmentId::new("EQ-9")),
            Err(LabError::NotFound { .. })
        ));
    }

    #[test]
    fn borrow_lifecycle_settles_the_bill() {
        let mut s = session();
        let now = at(2025, 3, 7, 16, 0);
        let out = s
            .apply_borrow(request(1, BorrowKind::Normal, at(2025, 3, 10, 9, 0), at(2025, 3, 10, 19, 0)), now)
            .unwrap();
        let id = out.record.id;
        assert_eq!(out.record.expected_hours, WorkHours::from_hours(10));

        s.approve(id).unwrap();
        s.check_out(id).unwrap();
        assert_eq!(s.equipment(&EquipmentId::new("EQ-1")).unwrap().state, EquipmentState::InUse);

        s.request_return(
            ReturnRequest {
                borrow: id,
                return_time: at(2025, 3, 10, 15, 30),
                position: Some("Cabinet 3".into()),
                interrupted: false,
                remarks: None,
            },
            at(2025, 3, 10, 15, 30),
        )
        .unwrap();
        let settled = s.confirm_return(id, ConfirmState::Normal).unwrap();

        assert_eq!(settled.actual_hours.to_string(), "6.50");
        assert_eq!(settled.total.unwrap().to_string(), "130.00");
        let record = s.borrow(id).unwrap();
        assert_eq!(record.return_status, ReturnStatus::Returned);
        let eq = s.equipment(&EquipmentId::new("EQ-1")).unwrap();
        assert_eq!(eq.state, EquipmentState::Available);
        assert_eq!(eq.deposit_position.as_deref(), Some("Cabinet 3"));
    }

    #[test]
    fn urgent_borrow_stores_delays_atomically() {
        let mut s = session();
        let now = at(2025, 3, 7, 16, 0);
        let queued = s
            .apply_borrow(request(1, BorrowKind::Normal, at(2025, 3, 10, 10, 0), at(2025, 3, 10, 14, 0)), now)
            .unwrap()
            .record
            .id;

        let out = s
            .apply_borrow(request(2, BorrowKind::Urgent, at(2025, 3, 10, 9, 0), at(2025, 3, 10, 12, 0)), now)
            .unwrap();
        assert_eq!(out.delays.len(), 1);

        let moved = s.borrow(queued).unwrap();
        assert_eq!(moved.start, at(2025, 3, 10, 12, 0));
        assert_eq!(moved.end, at(2025, 3, 10, 16, 0));
        assert_eq!(moved.expected_hours, WorkHours::from_hours(4));

        let order: Vec<_> = s
            .borrows_for(&EquipmentId::new("EQ-1"))
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(order, vec![out.record.id, queued]);
    }

    #[test]
    fn resuming_marks_the_interrupted_record() {
        let mut s = session();
        let now = at(2025, 3, 7, 16, 0);
        let id = s
            .apply_borrow(request(5, BorrowKind::Normal, at(2025, 3, 10, 9, 0), at(2025, 3, 10, 19, 0)), now)
            .unwrap()
            .record
            .id;
        s.approve(id).unwrap();
        s.check_out(id).unwrap();
        s.request_return(
            ReturnRequest {
                borrow: id,
                return_time: at(2025, 3, 10, 13, 0),
                position: None,
                interrupted: true,
                remarks: None,
            },
            at(2025, 3, 10, 13, 0),
        )
        .unwrap();
        s.confirm_return(id, ConfirmState::Normal).unwrap();

        let window = s
            .allowed_window(&EquipmentId::new("EQ-1"), UserId(5), BorrowKind::ResumeInterrupted, at(2025, 3, 11, 9, 0))
            .unwrap();
        assert_eq!(window.latest_end, Some(at(2025, 3, 11, 15, 0)));

        s.apply_borrow(
            request(5, BorrowKind::ResumeInterrupted, at(2025, 3, 11, 9, 0), at(2025, 3, 11, 15, 0)),
            at(2025, 3, 11, 9, 0),
        )
        .unwrap();
        assert!(s.borrow(id).unwrap().interrupt_resumed);

        let again = s.apply_borrow(
            request(5, BorrowKind::ResumeInterrupted, at(2025, 3, 12, 9, 0), at(2025, 3, 12, 10, 0)),
            at(2025, 3, 12, 9, 0),
        );
        assert_eq!(again.unwrap_err(), LabError::NoInterruptedBorrow);
    }

    #[test]
    fn rejected_borrow_cannot_be_checked_out() {
        let mut s = session();
        let id = s
            .apply_borrow(
                request(1, BorrowKind::Normal, at(2025, 3, 10, 9, 0), at(2025, 3, 10, 12, 0)),
                at(2025, 3, 7, 9, 0),
            )
            .unwrap()
            .record
            .id;
        let record = s.reject(id, Some("under audit".into())).unwrap();
        assert_eq!(record.approval, Approval::Rejected);
        assert!(s.check_out(id).is_err());
        assert!(s.cancel(id).unwrap().deleted);
    }

    #[test]
    fn calibration_moves_equipment_and_refresh_flags_due() {
        let mut s = session();
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let input = CalibrationInput {
            equipment_id: EquipmentId::new("EQ-1"),
            calibration_date: NaiveDate::from_ymd_opt(2024, 7, 20).unwrap(),
            recalibration_date: None,
            cycle_months: None,
            state: CalibrationState::SentOut,
            specification: None,
            environment: None,
            certificate: None,
            remarks: None,
        };
        let info = s.upsert_calibration(input.clone(), today).unwrap();
        assert_eq!(info.due, DueStatus::Days(48));
        assert_eq!(
            s.equipment(&EquipmentId::new("EQ-1")).unwrap().state,
            EquipmentState::Maintenance
        );

        let done = CalibrationInput {
            state: CalibrationState::Completed,
            ..input
        };
        let again = s.upsert_calibration(done, today).unwrap();
        assert_eq!(again.id, info.id);
        assert_eq!(
            s.equipment(&EquipmentId::new("EQ-1")).unwrap().state,
            EquipmentState::Available
        );

        let later = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        assert_eq!(s.refresh_calibrations(later).unwrap(), 1);
        assert_eq!(s.calibrations().unwrap()[0].state, CalibrationState::PendingSubmission);
        assert_eq!(s.refresh_calibrations(later).unwrap(), 0);
    }

    #[test]
    fn maintenance_returns_equipment_to_service() {
        let mut s = session();
        let mut eq = s.equipment(&EquipmentId::new("EQ-1")).unwrap();
        eq.state = EquipmentState::Maintenance;
        s.store.commit(ChangeSet {
            equipment: vec![eq],
            ..ChangeSet::default()
        })
        .unwrap();

        let record = s
            .complete_maintenance(MaintenanceReport {
                equipment_id: EquipmentId::new("EQ-1"),
                down_time: at(2025, 3, 3, 9, 0),
                up_time: at(2025, 3, 5, 17, 0),
                reason: Some("fan replaced".into()),
                maintainer: None,
            })
            .unwrap();
        assert_eq!(record.id, RecordId(1));
        assert_eq!(
            s.equipment(&EquipmentId::new("EQ-1")).unwrap().state,
            EquipmentState::Available
        );
    }

    #[test]
    fn reminders_fire_once() {
        let mut s = session();
        let id = s
            .apply_borrow(
                request(1, BorrowKind::Normal, at(2025, 3, 10, 9, 0), at(2025, 3, 10, 19, 0)),
                at(2025, 3, 7, 9, 0),
            )
            .unwrap()
            .record
            .id;
        s.approve(id).unwrap();
        s.check_out(id).unwrap();

        let lead = Duration::days(1);
        assert_eq!(s.remind_returns(at(2025, 3, 10, 12, 0), lead).unwrap().len(), 1);
        assert!(s.remind_returns(at(2025, 3, 10, 13, 0), lead).unwrap().is_empty());
        let overdue = s.remind_returns(at(2025, 3, 11, 9, 0), lead).unwrap();
        assert!(matches!(overdue[0], ReturnReminder::Overdue { .. }));
        assert!(s.borrow(id).unwrap().overtime_reminded);
    }

    #[test]
    fn currencies_update_by_short_name() {
        let mut s = session();
        let now = at(2025, 6, 1, 8, 0);
        let usd = s.upsert_currency("US Dollar", "USD", None, now).unwrap();
        s.upsert_currency("Euro", "EUR", None, now).unwrap();

        let mut rates = BTreeMap::new();
        rates.insert("USD".to_string(), "0.13850".parse().unwrap());
        assert_eq!(s.update_currency_rates(&rates, now).unwrap(), 1);

        let renamed = s.upsert_currency("Dollar", "USD", None, now).unwrap();
        assert_eq!(renamed.id, usd.id);
        assert_eq!(renamed.exchange_rate.unwrap().to_string(), "0.13850");
    }

    #[test]
    fn repair_time_report_reads_stored_repairs() {
        let mut s = session();
        s.complete_maintenance(MaintenanceReport {
            equipment_id: EquipmentId::new("EQ-1"),
            down_time: at(2025, 3, 10, 9, 0),
            up_time: at(2025, 3, 10, 14, 0),
            reason: None,
            maintainer: Some("lee".into()),
        })
        .unwrap();
        let week = Period::new(at(2025, 3, 10, 9, 0), at(2025, 3, 14, 19, 0));

        let report = s.maintenance_time_report(week, None).unwrap();
        assert_eq!(report.lines[0].hours, WorkHours::from_hours(5));
        assert_eq!(report.lines[0].rate_bp, 1_000);
        assert!(s.maintenance_time_report(week, Some("wang")).unwrap().lines.is_empty());
    }

    fn foundry_session() -> (Session, FoundryAsset) {
        let mut s = session();
        let now = at(2025, 6, 1, 9, 0);
        s.upsert_currency("US Dollar", "USD", Some("0.13850".parse().unwrap()), now)
            .unwrap();
        let asset = s
            .register_foundry_asset(FoundryAssetInput {
                kind: AssetKind::Equipment,
                name: "ATE tester".into(),
                purchase_order_no: Some("PO-1".into()),
                factory: Some("Fab A".into()),
                project: Some("ADC".into()),
                number: 5,
                unit_price: "200.00".parse().unwrap(),
                currency: "USD".into(),
                remarks: None,
            })
            .unwrap();
        (s, asset)
    }

    fn transfer(asset: RecordId, number: u32) -> TransferRequest {
        TransferRequest {
            asset,
            number,
            factory: Some("Fab B".into()),
            project: Some("PLL".into()),
            operator: Some("lee".into()),
            remarks: None,
        }
    }

    #[test]
    fn foundry_asset_needs_a_known_currency() {
        let mut s = session();
        let err = s
            .register_foundry_asset(FoundryAssetInput {
                kind: AssetKind::Tooling,
                name: "Socket".into(),
                purchase_order_no: None,
                factory: None,
                project: None,
                number: 1,
                unit_price: "1.00".parse().unwrap(),
                currency: "XYZ".into(),
                remarks: None,
            })
            .unwrap_err();
        assert!(matches!(err, LabError::NotFound { kind: "currency", .. }));
    }

    #[test]
    fn partial_transfer_stores_split_and_log_together() {
        let (mut s, asset) = foundry_session();
        assert_eq!(asset.base_total.unwrap().to_string(), "7220.22");

        let out = s
            .foundry_transfer(transfer(asset.id, 2), at(2025, 6, 2, 10, 0))
            .unwrap();
        let split = out.split.unwrap();
        assert_eq!(s.foundry_asset(asset.id).unwrap().number, 3);
        assert_eq!(s.foundry_asset(asset.id).unwrap().total.to_string(), "600.00");
        let stored = s.foundry_asset(split.id).unwrap();
        assert_eq!(stored.number, 2);
        assert_eq!(stored.factory.as_deref(), Some("Fab B"));
        assert_eq!(stored.project.as_deref(), Some("PLL"));
        assert_eq!(stored.base_total.unwrap().to_string(), "2888.09");

        let log = s.foundry_transfers().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].split_into, Some(split.id));
        assert_eq!(log[0].before_factory.as_deref(), Some("Fab A"));
        assert_eq!(log[0].after_project.as_deref(), Some("PLL"));
    }

    #[test]
    fn full_transfer_moves_the_record() {
        let (mut s, asset) = foundry_session();
        let out = s
            .foundry_transfer(transfer(asset.id, 5), at(2025, 6, 2, 10, 0))
            .unwrap();
        assert!(out.split.is_none());
        assert_eq!(s.foundry_assets().unwrap().len(), 1);
        assert_eq!(s.foundry_asset(asset.id).unwrap().factory.as_deref(), Some("Fab B"));
    }

    #[test]
    fn oversized_transfer_changes_nothing() {
        let (mut s, asset) = foundry_session();
        let err = s
            .foundry_transfer(transfer(asset.id, 6), at(2025, 6, 2, 10, 0))
            .unwrap_err();
        assert!(matches!(err, LabError::TransferExceedsStock { requested: 6, on_hand: 5 }));
        assert_eq!(s.foundry_asset(asset.id).unwrap(), asset);
        assert!(s.foundry_transfers().unwrap().is_empty());
    }
}
