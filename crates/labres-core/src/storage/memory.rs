//! In-memory backend.

use super::{ChangeSet, LabStore, Sequence};
use crate::borrow::BorrowRecord;
use crate::calibration::{CalibrationInfo, MaintainInfo, MaintenanceRecord};
use crate::equipment::Equipment;
use crate::foundry::{FoundryAsset, FoundryTransfer};
use crate::money::Currency;
use crate::settlement::ReturnApplication;
use crate::{EquipmentId, LabError, RecordId, Result};
use std::collections::BTreeMap;

/// Ordered maps keyed like the redb tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    equipment: BTreeMap<EquipmentId, Equipment>,
    borrows: BTreeMap<RecordId, BorrowRecord>,
    returns: BTreeMap<RecordId, ReturnApplication>,
    calibrations: BTreeMap<RecordId, CalibrationInfo>,
    maintains: BTreeMap<RecordId, MaintainInfo>,
    maintenance: BTreeMap<RecordId, MaintenanceRecord>,
    currencies: BTreeMap<RecordId, Currency>,
    foundry_assets: BTreeMap<RecordId, FoundryAsset>,
    foundry_transfers: BTreeMap<RecordId, FoundryTransfer>,
    sequences: BTreeMap<Sequence, u64>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LabStore for MemoryStore {
    fn equipment(&self, id: &EquipmentId) -> Result<Option<Equipment>> {
        Ok(self.equipment.get(id).cloned())
    }

    fn all_equipment(&self) -> Result<Vec<Equipment>> {
        Ok(self.equipment.values().cloned().collect())
    }

    fn borrow(&self, id: RecordId) -> Result<Option<BorrowRecord>> {
        Ok(self.borrows.get(&id).cloned())
    }

    fn borrows(&self) -> Result<Vec<BorrowRecord>> {
        Ok(self.borrows.values().cloned().collect())
    }

    fn return_application(&self, borrow: RecordId) -> Result<Option<ReturnApplication>> {
        Ok(self.returns.get(&borrow).cloned())
    }

    fn calibrations(&self) -> Result<Vec<CalibrationInfo>> {
        Ok(self.calibrations.values().cloned().collect())
    }

    fn maintains(&self) -> Result<Vec<MaintainInfo>> {
        Ok(self.maintains.values().cloned().collect())
    }

    fn maintenance_records(&self) -> Result<Vec<MaintenanceRecord>> {
        Ok(self.maintenance.values().cloned().collect())
    }

    fn currencies(&self) -> Result<Vec<Currency>> {
        Ok(self.currencies.values().cloned().collect())
    }

    fn foundry_asset(&self, id: RecordId) -> Result<Option<FoundryAsset>> {
        Ok(self.foundry_assets.get(&id).cloned())
    }

    fn foundry_assets(&self) -> Result<Vec<FoundryAsset>> {
        Ok(self.foundry_assets.values().cloned().collect())
    }

    fn foundry_transfers(&self) -> Result<Vec<FoundryTransfer>> {
        Ok(self.foundry_transfers.values().cloned().collect())
    }

    fn allocate_id(&mut self, sequence: Sequence) -> Result<RecordId> {
        let counter = self.sequences.entry(sequence).or_insert(0);
        *counter = counter
            .checked_add(1)
            .ok_or_else(|| LabError::Storage(format!("sequence {} exhausted", sequence.key())))?;
        Ok(RecordId(*counter))
    }

    fn commit(&mut self, changes: ChangeSet) -> Result<()> {
        for eq in changes.equipment {
            self.equipment.insert(eq.id.clone(), eq);
        }
        for record in changes.borrows {
            self.borrows.insert(record.id, record);
        }
        for application in changes.returns {
            self.returns.insert(application.borrow, application);
        }
        for info in changes.calibrations {
            self.calibrations.insert(info.id, info);
        }
        for info in changes.maintains {
            self.maintains.insert(info.id, info);
        }
        for record in changes.maintenance {
            self.maintenance.insert(record.id, record);
        }
        for currency in changes.currencies {
            self.currencies.insert(currency.id, currency);
        }
        for asset in changes.foundry_assets {
            self.foundry_assets.insert(asset.id, asset);
        }
        for transfer in changes.foundry_transfers {
            self.foundry_transfers.insert(transfer.id, transfer);
        }
        Ok(())
    }
}
