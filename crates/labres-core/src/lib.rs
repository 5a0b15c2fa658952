//! # Labres Core
//!
//! Deterministic business rules for the lab equipment backend.
//!
//! This crate contains:
//! - The holiday-aware work calendar and work-hour arithmetic
//! - Borrow scheduling policy with the queued-borrow delay cascade
//! - Return settlement, calibration upkeep and return reminders
//! - Usage, repair-time and fee reporting
//! - Fixed-point money and foundry asset transfers
//! - The `LabStore` persistence trait (in-memory and redb)
//!
//! ## Constraints
//!
//! - No floating point anywhere: hours are centihours, money is cents.
//! - No wall clock: every operation that depends on "now" takes it as input.
//! - Ordered collections only (`BTreeMap`/`BTreeSet`).

pub mod borrow;
pub mod calendar;
pub mod calibration;
pub mod equipment;
pub mod foundry;
pub mod money;
pub mod period;
pub mod reminder;
pub mod report;
pub mod session;
pub mod settlement;
pub mod storage;
pub mod usage;
pub mod worktime;

mod fixed;

pub use borrow::{
    Approval, BorrowKind, BorrowPlan, BorrowPolicy, BorrowRecord, BorrowRequest, BorrowWindow,
    Delay, ReturnStatus,
};
pub use calendar::{WorkCalendar, WorkDay};
pub use calibration::{
    CalibrationInfo, CalibrationInput, CalibrationState, DueStatus, MaintainInfo, MaintainInput,
    MaintenanceRecord, UpkeepKind, due_status, pm_quarters, recalibration_date,
};
pub use equipment::{Equipment, EquipmentState, FixedAssetCategory, ManageType, ServiceType};
pub use foundry::{
    AssetKind, FoundryAsset, FoundryAssetInput, FoundryTransfer, TransferPlan, TransferRequest,
    plan_transfer,
};
pub use money::{Currency, ExchangeRate, Money, foundry_total};
pub use period::{Period, PeriodKind, natural_period};
pub use reminder::ReturnReminder;
pub use report::{
    FeeFilter, FeeLine, FeeReport, MaintenanceTime, MaintenanceTimeReport, ProjectFees,
};
pub use session::{BorrowOutcome, MaintenanceReport, Session, TransferOutcome};
pub use settlement::{ConfirmState, ReturnApplication, ReturnRequest, Settlement};
pub use storage::{ChangeSet, LabStore, MemoryStore, RedbStore, Sequence};
pub use usage::{EquipmentUsage, UsageLine, UsageReport};
pub use worktime::WorkHours;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Equipment identifier (the asset tag printed on the instrument).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EquipmentId(pub String);

impl EquipmentId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EquipmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a lab member.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct UserId(pub u64);

/// Identifier of a stored record (borrow, calibration, maintain info, currency).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Errors raised by the business rules and the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabError {
    #[error("equipment {id} is currently {state}, it cannot be borrowed right now")]
    EquipmentUnavailable { id: EquipmentId, state: EquipmentState },

    #[error("borrow window is empty: end {end} is not after start {start}")]
    InvalidWindow {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("the earliest possible borrow start is {earliest}")]
    StartTooEarly { earliest: NaiveDateTime },

    #[error("the latest possible borrow end is {latest}")]
    EndTooLate { latest: NaiveDateTime },

    #[error("there is no interrupted borrow to resume")]
    NoInterruptedBorrow,

    #[error("no borrow hours remain on the interrupted borrow")]
    NoRemainingHours,

    #[error("cannot transfer {requested}, only {on_hand} on hand")]
    TransferExceedsStock { requested: u32, on_hand: u32 },

    #[error("a return has already been requested for borrow {0}")]
    ReturnAlreadyRequested(RecordId),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("{kind} not recognised: {value}")]
    UnknownValue { kind: &'static str, value: String },

    #[error("invalid work day: start {start} must be before end {end}")]
    InvalidWorkDay { start: String, end: String },

    #[error("no working day found within the search horizon starting at {from}")]
    CalendarExhausted { from: NaiveDate },

    #[error("date arithmetic out of range")]
    DateOutOfRange,

    #[error("invalid fixed-point value: {0}")]
    InvalidAmount(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl LabError {
    pub(crate) fn not_found(kind: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, LabError>;
