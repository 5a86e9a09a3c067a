//! Closed set of persisted field identifiers and their typed values.
//!
//! Every externally-persisted attribute of a power node has exactly one
//! [`FieldKey`]. Nodes mark keys dirty when they write the attribute, and
//! the persistence layer stores a [`FieldValue`] per key on the world
//! object's record.

use crate::fixed::Fixed64;
use crate::id::NetworkId;
use serde::{Deserialize, Serialize};

/// Identifies one persisted attribute of a power node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldKey {
    // -- Shared by every node --
    NetworkId,
    Active,

    // -- Source --
    Fuel,
    FuelCapacity,
    FuelType,
    IsRunning,

    // -- Storage --
    Energy,
    EnergyCapacity,

    // -- Consumer --
    BasePowerConsumption,
    Intensity,
    IsDemanding,

    // -- Conduit --
    ConduitMode,
}

impl FieldKey {
    /// Fields every node persists regardless of kind.
    pub const BASE: &'static [FieldKey] = &[FieldKey::NetworkId, FieldKey::Active];
}

/// A typed persisted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Bool(bool),
    Int(i32),
    Fixed(Fixed64),
    Text(String),
}

impl FieldValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_fixed(&self) -> Option<Fixed64> {
        match self {
            FieldValue::Fixed(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v)
    }
}

impl From<Fixed64> for FieldValue {
    fn from(v: Fixed64) -> Self {
        FieldValue::Fixed(v)
    }
}

impl From<&NetworkId> for FieldValue {
    fn from(v: &NetworkId) -> Self {
        FieldValue::Text(v.0.clone())
    }
}
