//! Equipment records and their lifecycle state.

use crate::money::Money;
use crate::{EquipmentId, LabError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a piece of equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EquipmentState {
    Available,
    InUse,
    Maintenance,
    Disabled,
    Custody,
    Scrapped,
}

impl EquipmentState {
    /// Numeric code used by the lab's inventory sheets.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Available => 1,
            Self::InUse => 2,
            Self::Maintenance => 3,
            Self::Disabled => 4,
            Self::Custody => 5,
            Self::Scrapped => 6,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Available),
            2 => Ok(Self::InUse),
            3 => Ok(Self::Maintenance),
            4 => Ok(Self::Disabled),
            5 => Ok(Self::Custody),
            6 => Ok(Self::Scrapped),
            other => Err(LabError::UnknownValue {
                kind: "equipment state code",
                value: other.to_string(),
            }),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::InUse => "in use",
            Self::Maintenance => "under maintenance",
            Self::Disabled => "disabled",
            Self::Custody => "in custody",
            Self::Scrapped => "scrapped",
        }
    }
}

impl fmt::Display for EquipmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EquipmentState {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(Self::Available),
            "in_use" | "in use" => Ok(Self::InUse),
            "maintenance" => Ok(Self::Maintenance),
            "disabled" => Ok(Self::Disabled),
            "custody" => Ok(Self::Custody),
            "scrapped" => Ok(Self::Scrapped),
            other => other
                .parse::<u8>()
                .map_err(|_| LabError::UnknownValue {
                    kind: "equipment state",
                    value: s.to_string(),
                })
                .and_then(Self::from_code),
        }
    }
}

/// How the equipment is handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    Unavailable,
    Requisition,
    OnDemand,
    Reservation,
    Dedicated,
}

/// Fixed asset category of the finance register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixedAssetCategory {
    AteTester,
    TesterCellMachine,
    ReliabilityEnvironment,
    MeasurementInstrumentation,
    NeedleTipAssembly,
    DeviceTestTooling,
    InspectionRework,
    OtherToolJigKit,
    FacilityEquipmentTool,
    AptMbSltSystem,
}

/// Upkeep regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManageType {
    Pm,
    Check,
    Inspection,
}

/// A trackable lab asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: EquipmentId,
    pub name: String,
    pub state: EquipmentState,
    pub service_type: Option<ServiceType>,
    pub category: Option<FixedAssetCategory>,
    pub manage_type: Option<ManageType>,
    /// Longest borrow a normal application may request, in calendar days.
    pub allow_borrow_days: Option<u32>,
    pub per_hour_price: Option<Money>,
    pub deposit_position: Option<String>,
    pub manager: Option<String>,
}

impl Equipment {
    /// Available equipment with no limits and no price.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: EquipmentId::new(id),
            name: name.into(),
            state: EquipmentState::Available,
            service_type: None,
            category: None,
            manage_type: None,
            allow_borrow_days: None,
            per_hour_price: None,
            deposit_position: None,
            manager: None,
        }
    }

    #[must_use]
    pub fn with_allow_borrow_days(mut self, days: u32) -> Self {
        self.allow_borrow_days = Some(days);
        self
    }

    #[must_use]
    pub fn with_price(mut self, price: Money) -> Self {
        self.per_hour_price = Some(price);
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: EquipmentState) -> Self {
        self.state = state;
        self
    }

    /// Fails unless the equipment can be handed out right now.
    pub fn ensure_borrowable(&self) -> Result<()> {
        if self.state != EquipmentState::Available {
            return Err(LabError::EquipmentUnavailable {
                id: self.id.clone(),
                state: self.state,
            });
        }
        Ok(())
    }
}
