//! Capacity-bounded energy reservoir with two-phase discharge.

use eitrgrid_core::field::{FieldKey, FieldValue};
use eitrgrid_core::fixed::{Fixed64, round_to_precision};
use eitrgrid_core::node::{FieldError, NodeBase, PersistedNode};

#[derive(Debug, Clone)]
pub struct StorageNode {
    base: NodeBase,
    energy: Fixed64,
    energy_capacity: Fixed64,
    /// Last grant handed out by `peek_discharge`; bounds the next commit.
    peeked_discharge_amount: Fixed64,
}

const STORAGE_FIELDS: &[FieldKey] = &[FieldKey::Energy, FieldKey::EnergyCapacity];

impl StorageNode {
    pub fn new(base: NodeBase, energy_capacity: Fixed64) -> Self {
        Self {
            base,
            energy: Fixed64::ZERO,
            energy_capacity: energy_capacity.max(Fixed64::ZERO),
            peeked_discharge_amount: Fixed64::ZERO,
        }
    }

    pub fn energy(&self) -> Fixed64 {
        self.energy
    }

    pub fn energy_capacity(&self) -> Fixed64 {
        self.energy_capacity
    }

    pub fn peeked_discharge_amount(&self) -> Fixed64 {
        self.peeked_discharge_amount
    }

    pub fn headroom(&self) -> Fixed64 {
        (self.energy_capacity - self.energy).max(Fixed64::ZERO)
    }

    pub fn needs_charging(&self) -> bool {
        self.energy < self.energy_capacity
    }

    /// Estimate a discharge of `amount` against `snapshot` without touching
    /// the stored energy. The grant is remembered so the next commit cannot
    /// exceed it.
    pub fn peek_discharge(&mut self, amount: Fixed64, snapshot: Fixed64) -> Fixed64 {
        let granted = if self.base.is_active() {
            round_to_precision(snapshot.min(amount).max(Fixed64::ZERO))
        } else {
            Fixed64::ZERO
        };
        self.peeked_discharge_amount = granted;
        granted
    }

    /// Remove up to `amount`, never more than the last peek nor the stored
    /// energy, then forget the peek. Returns what was discharged.
    pub fn commit_discharge(&mut self, amount: Fixed64) -> Fixed64 {
        let discharged = amount
            .min(self.peeked_discharge_amount)
            .min(self.energy)
            .max(Fixed64::ZERO);
        self.peeked_discharge_amount = Fixed64::ZERO;
        if discharged > Fixed64::ZERO {
            self.energy -= discharged;
            self.base.mark_dirty(FieldKey::Energy);
        }
        discharged
    }

    /// Charge immediately, clamped to the remaining headroom. Returns the
    /// amount accepted.
    pub fn add_energy(&mut self, amount: Fixed64) -> Fixed64 {
        let accepted = amount.max(Fixed64::ZERO).min(self.headroom());
        if accepted > Fixed64::ZERO {
            self.energy += accepted;
            self.base.mark_dirty(FieldKey::Energy);
        }
        accepted
    }
}

impl PersistedNode for StorageNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn kind_fields(&self) -> &'static [FieldKey] {
        STORAGE_FIELDS
    }

    fn kind_field_value(&self, key: FieldKey) -> Option<FieldValue> {
        match key {
            FieldKey::Energy => Some(self.energy.into()),
            FieldKey::EnergyCapacity => Some(self.energy_capacity.into()),
            _ => None,
        }
    }

    fn apply_kind_field(&mut self, key: FieldKey, value: &FieldValue) -> Result<(), FieldError> {
        let v = value.as_fixed().ok_or(FieldError::TypeMismatch { key })?;
        match key {
            FieldKey::Energy => self.energy = v.max(Fixed64::ZERO).min(self.energy_capacity),
            FieldKey::EnergyCapacity => {
                self.energy_capacity = v.max(Fixed64::ZERO);
                self.energy = self.energy.min(self.energy_capacity);
            }
            _ => return Err(FieldError::NotPersisted { key }),
        }
        Ok(())
    }
}
