//! # Storage Module
//!
//! Persistence for equipment, borrows, returns, upkeep records,
//! currencies and foundry assets behind the [`LabStore`] trait.
//!
//! Writes go through [`LabStore::commit`]: a [`ChangeSet`] is applied as a
//! whole or not at all. This is what keeps a borrow and the delays it
//! causes consistent.
//!
//! Backends:
//! - [`MemoryStore`]: ordered in-memory maps, for tests and dry runs
//! - [`RedbStore`]: redb tables with postcard-encoded values

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::borrow::BorrowRecord;
use crate::calibration::{CalibrationInfo, MaintainInfo, MaintenanceRecord};
use crate::equipment::Equipment;
use crate::foundry::{FoundryAsset, FoundryTransfer};
use crate::money::Currency;
use crate::settlement::ReturnApplication;
use crate::{EquipmentId, RecordId, Result};
use serde::{Deserialize, Serialize};

/// Id sequences. Each starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sequence {
    Borrow,
    Calibration,
    Maintain,
    Maintenance,
    Currency,
    FoundryAsset,
    FoundryTransfer,
}

impl Sequence {
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Borrow => "borrow",
            Self::Calibration => "calibration",
            Self::Maintain => "maintain",
            Self::Maintenance => "maintenance",
            Self::Currency => "currency",
            Self::FoundryAsset => "foundry_asset",
            Self::FoundryTransfer => "foundry_transfer",
        }
    }
}

/// Records to insert or overwrite in one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub equipment: Vec<Equipment>,
    pub borrows: Vec<BorrowRecord>,
    pub returns: Vec<ReturnApplication>,
    pub calibrations: Vec<CalibrationInfo>,
    pub maintains: Vec<MaintainInfo>,
    pub maintenance: Vec<MaintenanceRecord>,
    pub currencies: Vec<Currency>,
    pub foundry_assets: Vec<FoundryAsset>,
    pub foundry_transfers: Vec<FoundryTransfer>,
}

impl ChangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.equipment.len()
            + self.borrows.len()
            + self.returns.len()
            + self.calibrations.len()
            + self.maintains.len()
            + self.maintenance.len()
            + self.currencies.len()
            + self.foundry_assets.len()
            + self.foundry_transfers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Storage backend.
pub trait LabStore {
    fn equipment(&self, id: &EquipmentId) -> Result<Option<Equipment>>;
    fn all_equipment(&self) -> Result<Vec<Equipment>>;

    fn borrow(&self, id: RecordId) -> Result<Option<BorrowRecord>>;
    /// Every borrow record, deleted ones included, ordered by id.
    fn borrows(&self) -> Result<Vec<BorrowRecord>>;

    /// The return application closing `borrow`.
    fn return_application(&self, borrow: RecordId) -> Result<Option<ReturnApplication>>;

    fn calibrations(&self) -> Result<Vec<CalibrationInfo>>;
    fn maintains(&self) -> Result<Vec<MaintainInfo>>;
    fn maintenance_records(&self) -> Result<Vec<MaintenanceRecord>>;
    fn currencies(&self) -> Result<Vec<Currency>>;

    fn foundry_asset(&self, id: RecordId) -> Result<Option<FoundryAsset>>;
    fn foundry_assets(&self) -> Result<Vec<FoundryAsset>>;
    /// Transfer log ordered by id.
    fn foundry_transfers(&self) -> Result<Vec<FoundryTransfer>>;

    /// Reserve the next id of a sequence.
    fn allocate_id(&mut self, sequence: Sequence) -> Result<RecordId>;

    /// Apply every change atomically.
    fn commit(&mut self, changes: ChangeSet) -> Result<()>;

    fn calibration_for(&self, equipment: &EquipmentId) -> Result<Option<CalibrationInfo>> {
        Ok(self
            .calibrations()?
            .into_iter()
            .find(|c| c.equipment_id == *equipment))
    }

    fn maintain_for(&self, equipment: &EquipmentId) -> Result<Option<MaintainInfo>> {
        Ok(self
            .maintains()?
            .into_iter()
            .find(|m| m.equipment_id == *equipment))
    }
}
