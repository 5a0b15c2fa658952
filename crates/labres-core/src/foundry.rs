//! # Foundry Assets
//!
//! Test equipment and tooling bought for foundry partners, kept per
//! factory and project, and the transfers that move stock between them.
//!
//! A transfer of the whole quantity re-homes the record. A partial
//! transfer leaves the remainder on the original record and moves the
//! transferred quantity to a new one; both totals are recomputed at the
//! currency's current rate.

use crate::money::{ExchangeRate, Money, foundry_total};
use crate::{LabError, RecordId, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    /// Test machines, masks and NRE.
    Equipment,
    /// Load boards, needle cards and accessories.
    Tooling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundryAsset {
    pub id: RecordId,
    pub kind: AssetKind,
    pub name: String,
    pub purchase_order_no: Option<String>,
    pub factory: Option<String>,
    pub project: Option<String>,
    pub number: u32,
    pub unit_price: Money,
    /// Currency short name, e.g. `USD`.
    pub currency: String,
    pub total: Money,
    /// Total in CNY. Absent while the currency has no rate.
    pub base_total: Option<Money>,
    pub remarks: Option<String>,
}

impl FoundryAsset {
    fn reprice(&mut self, number: u32, rate: Option<ExchangeRate>) {
        let (total, base_total) = foundry_total(number, self.unit_price, rate);
        self.number = number;
        self.total = total;
        self.base_total = base_total;
    }
}

/// A new foundry purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundryAssetInput {
    pub kind: AssetKind,
    pub name: String,
    #[serde(default)]
    pub purchase_order_no: Option<String>,
    #[serde(default)]
    pub factory: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    pub number: u32,
    pub unit_price: Money,
    pub currency: String,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl FoundryAssetInput {
    pub fn into_asset(self, id: RecordId, rate: Option<ExchangeRate>) -> Result<FoundryAsset> {
        if self.number == 0 {
            return Err(LabError::InvalidAmount("quantity must be positive".into()));
        }
        let mut asset = FoundryAsset {
            id,
            kind: self.kind,
            name: self.name,
            purchase_order_no: self.purchase_order_no,
            factory: self.factory,
            project: self.project,
            number: 0,
            unit_price: self.unit_price,
            currency: self.currency,
            total: Money::ZERO,
            base_total: None,
            remarks: self.remarks,
        };
        asset.reprice(self.number, rate);
        Ok(asset)
    }
}

/// Move `number` units of an asset to another factory and/or project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub asset: RecordId,
    pub number: u32,
    #[serde(default)]
    pub factory: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Log entry of one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundryTransfer {
    pub id: RecordId,
    /// The record the stock was taken from.
    pub asset: RecordId,
    /// The record holding the transferred stock after a split.
    pub split_into: Option<RecordId>,
    pub number: u32,
    pub before_factory: Option<String>,
    pub after_factory: Option<String>,
    pub before_project: Option<String>,
    pub after_project: Option<String>,
    pub operator: Option<String>,
    pub transfer_time: NaiveDateTime,
    pub remarks: Option<String>,
}

/// Records written by a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPlan {
    /// The original record, re-homed or reduced to the remainder.
    pub source: FoundryAsset,
    /// The new record a partial transfer creates.
    pub split: Option<FoundryAsset>,
}

/// Work out the records a transfer leaves behind.
///
/// `split_id` is called only for a partial transfer.
pub fn plan_transfer(
    asset: &FoundryAsset,
    request: &TransferRequest,
    rate: Option<ExchangeRate>,
    split_id: impl FnOnce() -> Result<RecordId>,
) -> Result<TransferPlan> {
    if request.number == 0 {
        return Err(LabError::InvalidAmount("quantity must be positive".into()));
    }
    if request.number > asset.number {
        return Err(LabError::TransferExceedsStock {
            requested: request.number,
            on_hand: asset.number,
        });
    }

    let rehome = |target: &mut FoundryAsset| {
        if let Some(factory) = &request.factory {
            target.factory = Some(factory.clone());
        }
        if let Some(project) = &request.project {
            target.project = Some(project.clone());
        }
    };

    let mut source = asset.clone();
    if request.number == asset.number {
        rehome(&mut source);
        return Ok(TransferPlan {
            source,
            split: None,
        });
    }

    source.reprice(asset.number - request.number, rate);
    let mut split = asset.clone();
    split.id = split_id()?;
    split.reprice(request.number, rate);
    rehome(&mut split);
    Ok(TransferPlan {
        source,
        split: Some(split),
    })
}

impl TransferPlan {
    /// The log entry for this plan.
    #[must_use]
    pub fn log(
        &self,
        id: RecordId,
        before: &FoundryAsset,
        request: &TransferRequest,
        at: NaiveDateTime,
    ) -> FoundryTransfer {
        let moved = self.split.as_ref().unwrap_or(&self.source);
        FoundryTransfer {
            id,
            asset: before.id,
            split_into: self.split.as_ref().map(|s| s.id),
            number: request.number,
            before_factory: before.factory.clone(),
            after_factory: moved.factory.clone(),
            before_project: before.project.clone(),
            after_project: moved.project.clone(),
            operator: request.operator.clone(),
            transfer_time: at,
            remarks: request.remarks.clone(),
        }
    }
}
