//! Tunable constants for the grid, with defaults matching the shipped game
//! content. Loaded from data files by `eitrgrid-data`.

use crate::fixed::{Fixed64, f64_to_fixed64};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Fuel types
// ---------------------------------------------------------------------------

/// The fuels a source can burn. The set is closed: content naming any other
/// fuel is rejected when parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelType {
    Coal,
    SurtlingCore,
    Eitr,
}

impl FuelType {
    pub const ALL: [FuelType; 3] = [FuelType::Coal, FuelType::SurtlingCore, FuelType::Eitr];

    pub fn name(self) -> &'static str {
        match self {
            FuelType::Coal => "coal",
            FuelType::SurtlingCore => "surtling_core",
            FuelType::Eitr => "eitr",
        }
    }

    /// Stable integer code used on persisted records.
    pub fn code(self) -> i32 {
        match self {
            FuelType::Coal => 0,
            FuelType::SurtlingCore => 1,
            FuelType::Eitr => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FuelTypeError {
    #[error("unknown fuel type '{0}'")]
    UnknownName(String),
    #[error("unknown fuel type code {0}")]
    UnknownCode(i32),
}

impl FromStr for FuelType {
    type Err = FuelTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FuelType::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| FuelTypeError::UnknownName(s.to_string()))
    }
}

impl TryFrom<i32> for FuelType {
    type Error = FuelTypeError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        FuelType::ALL
            .into_iter()
            .find(|f| f.code() == code)
            .ok_or(FuelTypeError::UnknownCode(code))
    }
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Efficiency multiplier per fuel type. Data files naming a fuel outside
/// [`FuelType::ALL`] fail to deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FuelTable {
    pub coal: f64,
    pub surtling_core: f64,
    pub eitr: f64,
}

impl Default for FuelTable {
    fn default() -> Self {
        Self {
            coal: 1.0,
            surtling_core: 2.5,
            eitr: 4.0,
        }
    }
}

impl FuelTable {
    pub fn efficiency(&self, fuel: FuelType) -> Fixed64 {
        let v = match fuel {
            FuelType::Coal => self.coal,
            FuelType::SurtlingCore => self.surtling_core,
            FuelType::Eitr => self.eitr,
        };
        f64_to_fixed64(v)
    }
}

// ---------------------------------------------------------------------------
// Conduit and replication settings
// ---------------------------------------------------------------------------

/// Conduit economy constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConduitConfig {
    /// Grid energy exchanged per character per interval.
    pub energy_per_interval: f64,
    /// Eitr per unit of grid energy.
    pub regen_cost: f64,
    /// Characters at or below this much eitr never take part.
    pub noise_floor: f64,
    /// Characters at or above this fraction of capacity are not charged.
    pub max_fill_ratio: f64,
    /// Real seconds between resource transfers.
    pub interval_seconds: f64,
}

impl Default for ConduitConfig {
    fn default() -> Self {
        Self {
            energy_per_interval: 1.0,
            regen_cost: 10.0,
            noise_floor: 0.01,
            max_fill_ratio: 0.9,
            interval_seconds: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Peers farther than this from every changed node are not notified.
    pub radius: f32,
    /// Seconds between dirty-to-message passes.
    pub interval_seconds: f64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            radius: 30.0,
            interval_seconds: 0.5,
        }
    }
}

/// Every tunable constant of the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub fuel_types: FuelTable,
    pub conduit: ConduitConfig,
    pub replication: ReplicationConfig,
    pub fuel_request_timeout_seconds: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            fuel_types: FuelTable::default(),
            conduit: ConduitConfig::default(),
            replication: ReplicationConfig::default(),
            fuel_request_timeout_seconds: 5.0,
        }
    }
}
