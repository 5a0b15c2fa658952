//! redb backend.
//!
//! One table per record kind. Values are postcard-encoded; keys are the
//! record id (or the equipment tag). Id sequences live in their own table
//! and are advanced in a dedicated write transaction.

use super::{ChangeSet, LabStore, Sequence};
use crate::borrow::BorrowRecord;
use crate::calibration::{CalibrationInfo, MaintainInfo, MaintenanceRecord};
use crate::equipment::Equipment;
use crate::foundry::{FoundryAsset, FoundryTransfer};
use crate::money::Currency;
use crate::settlement::ReturnApplication;
use crate::{EquipmentId, LabError, RecordId, Result};
use redb::{Database, Key, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::Path;

type RecordTable = TableDefinition<'static, u64, &'static [u8]>;

const EQUIPMENT: TableDefinition<'static, &str, &[u8]> = TableDefinition::new("equipment");
const BORROWS: RecordTable = TableDefinition::new("borrows");
const RETURNS: RecordTable = TableDefinition::new("returns");
const CALIBRATIONS: RecordTable = TableDefinition::new("calibrations");
const MAINTAINS: RecordTable = TableDefinition::new("maintains");
const MAINTENANCE: RecordTable = TableDefinition::new("maintenance");
const CURRENCIES: RecordTable = TableDefinition::new("currencies");
const FOUNDRY_ASSETS: RecordTable = TableDefinition::new("foundry_assets");
const FOUNDRY_TRANSFERS: RecordTable = TableDefinition::new("foundry_transfers");
const SEQUENCES: TableDefinition<'static, &str, u64> = TableDefinition::new("sequences");

const RECORD_TABLES: [RecordTable; 8] = [
    BORROWS,
    RETURNS,
    CALIBRATIONS,
    MAINTAINS,
    MAINTENANCE,
    CURRENCIES,
    FOUNDRY_ASSETS,
    FOUNDRY_TRANSFERS,
];

fn storage_err(e: impl fmt::Display) -> LabError {
    LabError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec(value).map_err(|e| LabError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    postcard::from_bytes(bytes).map_err(|e| LabError::Serialization(e.to_string()))
}

/// Disk-backed store.
pub struct RedbStore {
    db: Database,
}

impl fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create the database at `path`, creating missing tables.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(storage_err)?;
        let txn = db.begin_write().map_err(storage_err)?;
        txn.open_table(EQUIPMENT).map_err(storage_err)?;
        txn.open_table(SEQUENCES).map_err(storage_err)?;
        for table in RECORD_TABLES {
            txn.open_table(table).map_err(storage_err)?;
        }
        txn.commit().map_err(storage_err)?;
        Ok(Self { db })
    }

    fn get<T: DeserializeOwned>(&self, def: RecordTable, key: u64) -> Result<Option<T>> {
        let txn = self.db.begin_read().map_err(storage_err)?;
        let table = txn.open_table(def).map_err(storage_err)?;
        let value = table.get(key).map_err(storage_err)?;
        value.map(|v| decode(v.value())).transpose()
    }

    fn scan<K, T>(&self, def: TableDefinition<'static, K, &'static [u8]>) -> Result<Vec<T>>
    where
        K: Key + 'static,
        T: DeserializeOwned,
    {
        let txn = self.db.begin_read().map_err(storage_err)?;
        let table = txn.open_table(def).map_err(storage_err)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(storage_err)? {
            let (_, value) = entry.map_err(storage_err)?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }
}

fn put_records<T: Serialize>(
    txn: &WriteTransaction,
    def: RecordTable,
    items: &[T],
    key: impl Fn(&T) -> u64,
) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    let mut table = txn.open_table(def).map_err(storage_err)?;
    for item in items {
        let bytes = encode(item)?;
        table.insert(key(item), bytes.as_slice()).map_err(storage_err)?;
    }
    Ok(())
}

impl LabStore for RedbStore {
    fn equipment(&self, id: &EquipmentId) -> Result<Option<Equipment>> {
        let txn = self.db.begin_read().map_err(storage_err)?;
        let table = txn.open_table(EQUIPMENT).map_err(storage_err)?;
        let value = table.get(id.as_str()).map_err(storage_err)?;
        value.map(|v| decode(v.value())).transpose()
    }

    fn all_equipment(&self) -> Result<Vec<Equipment>> {
        self.scan(EQUIPMENT)
    }

    fn borrow(&self, id: RecordId) -> Result<Option<BorrowRecord>> {
        self.get(BORROWS, id.0)
    }

    fn borrows(&self) -> Result<Vec<BorrowRecord>> {
        self.scan(BORROWS)
    }

    fn return_application(&self, borrow: RecordId) -> Result<Option<ReturnApplication>> {
        self.get(RETURNS, borrow.0)
    }

    fn calibrations(&self) -> Result<Vec<CalibrationInfo>> {
        self.scan(CALIBRATIONS)
    }

    fn maintains(&self) -> Result<Vec<MaintainInfo>> {
        self.scan(MAINTAINS)
    }

    fn maintenance_records(&self) -> Result<Vec<MaintenanceRecord>> {
        self.scan(MAINTENANCE)
    }

    fn currencies(&self) -> Result<Vec<Currency>> {
        self.scan(CURRENCIES)
    }

    fn foundry_asset(&self, id: RecordId) -> Result<Option<FoundryAsset>> {
        self.get(FOUNDRY_ASSETS, id.0)
    }

    fn foundry_assets(&self) -> Result<Vec<FoundryAsset>> {
        self.scan(FOUNDRY_ASSETS)
    }

    fn foundry_transfers(&self) -> Result<Vec<FoundryTransfer>> {
        self.scan(FOUNDRY_TRANSFERS)
    }

    fn allocate_id(&mut self, sequence: Sequence) -> Result<RecordId> {
        let txn = self.db.begin_write().map_err(storage_err)?;
        let next = {
            let mut table = txn.open_table(SEQUENCES).map_err(storage_err)?;
            let current = table
                .get(sequence.key())
                .map_err(storage_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            let next = current
                .checked_add(1)
                .ok_or_else(|| LabError::Storage(format!("sequence {} exhausted", sequence.key())))?;
            table.insert(sequence.key(), next).map_err(storage_err)?;
            next
        };
        txn.commit().map_err(storage_err)?;
        Ok(RecordId(next))
    }

    fn commit(&mut self, changes: ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        // Dropping the transaction on any error aborts every write below.
        let txn = self.db.begin_write().map_err(storage_err)?;
        if !changes.equipment.is_empty() {
            let mut table = txn.open_table(EQUIPMENT).map_err(storage_err)?;
            for eq in &changes.equipment {
                let bytes = encode(eq)?;
                table
                    .insert(eq.id.as_str(), bytes.as_slice())
                    .map_err(storage_err)?;
            }
        }
        put_records(&txn, BORROWS, &changes.borrows, |r| r.id.0)?;
        put_records(&txn, RETURNS, &changes.returns, |a| a.borrow.0)?;
        put_records(&txn, CALIBRATIONS, &changes.calibrations, |c| c.id.0)?;
        put_records(&txn, MAINTAINS, &changes.maintains, |m| m.id.0)?;
        put_records(&txn, MAINTENANCE, &changes.maintenance, |m| m.id.0)?;
        put_records(&txn, CURRENCIES, &changes.currencies, |c| c.id.0)?;
        put_records(&txn, FOUNDRY_ASSETS, &changes.foundry_assets, |a| a.id.0)?;
        put_records(&txn, FOUNDRY_TRANSFERS, &changes.foundry_transfers, |t| t.id.0)?;
        txn.commit().map_err(storage_err)
    }
}
