//! Fuel-backed producer.
//!
//! A source converts stored fuel into energy, bounded both by its output rate
//! and by how fast it can burn fuel. Offers are computed against a fuel
//! snapshot without touching state; fuel is only deducted by
//! [`SourceNode::commit_energy_used`]. Fuel added mid-tick waits in
//! `pending_fuel` until the next commit merges it, so a refuel can never
//! fund an offer that was already computed.

use eitrgrid_core::config::{FuelTable, FuelType};
use eitrgrid_core::field::{FieldKey, FieldValue};
use eitrgrid_core::fixed::{FUEL_EPSILON, Fixed64, div_or_zero};
use eitrgrid_core::node::{FieldError, NodeBase, PersistedNode};
use serde::{Deserialize, Serialize};

/// Static tuning of a source, as authored in content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub fuel_capacity: Fixed64,
    /// Energy per second cap.
    pub output_rate: Fixed64,
    /// Fuel per second cap.
    pub fuel_consumption_rate: Fixed64,
    /// Energy per unit of fuel, before efficiency.
    pub fuel_energy_yield: Fixed64,
    pub fuel_type: FuelType,
}

#[derive(Debug, Clone)]
pub struct SourceNode {
    base: NodeBase,
    fuel: Fixed64,
    pending_fuel: Fixed64,
    fuel_capacity: Fixed64,
    output_rate: Fixed64,
    fuel_consumption_rate: Fixed64,
    fuel_energy_yield: Fixed64,
    fuel_type: FuelType,
    fuel_efficiency: Fixed64,
    fuel_table: FuelTable,
    is_running: bool,
}

const SOURCE_FIELDS: &[FieldKey] = &[
    FieldKey::Fuel,
    FieldKey::FuelCapacity,
    FieldKey::FuelType,
    FieldKey::IsRunning,
];

impl SourceNode {
    pub fn new(base: NodeBase, spec: SourceSpec, fuels: &FuelTable) -> Self {
        Self {
            base,
            fuel: Fixed64::ZERO,
            pending_fuel: Fixed64::ZERO,
            fuel_capacity: spec.fuel_capacity.max(Fixed64::ZERO),
            output_rate: spec.output_rate.max(Fixed64::ZERO),
            fuel_consumption_rate: spec.fuel_consumption_rate.max(Fixed64::ZERO),
            fuel_energy_yield: spec.fuel_energy_yield.max(Fixed64::ZERO),
            fuel_type: spec.fuel_type,
            fuel_efficiency: fuels.efficiency(spec.fuel_type),
            fuel_table: fuels.clone(),
            is_running: false,
        }
    }

    pub fn fuel(&self) -> Fixed64 {
        self.fuel
    }

    pub fn pending_fuel(&self) -> Fixed64 {
        self.pending_fuel
    }

    pub fn fuel_capacity(&self) -> Fixed64 {
        self.fuel_capacity
    }

    pub fn output_rate(&self) -> Fixed64 {
        self.output_rate
    }

    pub fn fuel_consumption_rate(&self) -> Fixed64 {
        self.fuel_consumption_rate
    }

    pub fn fuel_energy_yield(&self) -> Fixed64 {
        self.fuel_energy_yield
    }

    pub fn fuel_type(&self) -> FuelType {
        self.fuel_type
    }

    pub fn fuel_efficiency(&self) -> Fixed64 {
        self.fuel_efficiency
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Energy released by one unit of fuel at the current efficiency.
    pub fn energy_per_fuel(&self) -> Fixed64 {
        self.fuel_energy_yield * self.fuel_efficiency
    }

    pub fn set_fuel_type(&mut self, fuel_type: FuelType) {
        self.fuel_efficiency = self.fuel_table.efficiency(fuel_type);
        if self.fuel_type != fuel_type {
            self.fuel_type = fuel_type;
            self.base.mark_dirty(FieldKey::FuelType);
        }
    }

    /// Activation callback: a source switched off stops running at once.
    pub fn set_active(&mut self, active: bool) -> bool {
        let changed = self.base.set_active(active);
        if changed && !active {
            self.set_running(false);
        }
        changed
    }

    fn set_running(&mut self, running: bool) {
        if self.is_running != running {
            self.is_running = running;
            self.base.mark_dirty(FieldKey::IsRunning);
        }
    }

    /// Ceiling shared by the offer and request paths.
    fn ceiling(&self, dt: Fixed64, remaining_demand: Fixed64, fuel_snapshot: Fixed64) -> Fixed64 {
        let max_fuel_burnable = (self.fuel_consumption_rate * dt).min(fuel_snapshot);
        let fuel_limited = max_fuel_burnable * self.energy_per_fuel();
        (self.output_rate * dt)
            .min(remaining_demand)
            .min(fuel_limited)
            .max(Fixed64::ZERO)
    }

    /// Non-mutating estimate of what this source could supply this tick.
    ///
    /// Zero when inactive, not demanded, demand already met, or out of fuel.
    pub fn get_offer_estimate(
        &self,
        dt: Fixed64,
        supplied_so_far: Fixed64,
        total_demand: Fixed64,
        is_demanding: bool,
        fuel_snapshot: Fixed64,
    ) -> Fixed64 {
        if !self.base.is_active()
            || !is_demanding
            || supplied_so_far >= total_demand
            || fuel_snapshot <= Fixed64::ZERO
        {
            return Fixed64::ZERO;
        }
        self.ceiling(dt, total_demand - supplied_so_far, fuel_snapshot)
    }

    /// Same ceiling as [`get_offer_estimate`](Self::get_offer_estimate)
    /// against the current fuel, updating the running flag. Fuel is not
    /// deducted; the caller commits separately.
    pub fn request_available_power(
        &mut self,
        dt: Fixed64,
        remaining_demand: Fixed64,
        is_demanding: bool,
    ) -> Fixed64 {
        let available = if !self.base.is_active()
            || !is_demanding
            || remaining_demand <= Fixed64::ZERO
            || self.fuel <= Fixed64::ZERO
        {
            Fixed64::ZERO
        } else {
            self.ceiling(dt, remaining_demand, self.fuel)
        };
        self.set_running(available > Fixed64::ZERO);
        available
    }

    /// Merge pending fuel, then burn the fuel that produced `energy_used`.
    /// Returns the fuel actually burned.
    pub fn commit_energy_used(&mut self, energy_used: Fixed64) -> Fixed64 {
        let before = self.fuel;
        if self.pending_fuel > Fixed64::ZERO {
            self.fuel = (self.fuel + self.pending_fuel).min(self.fuel_capacity);
            self.pending_fuel = Fixed64::ZERO;
        }
        let merged = self.fuel;

        let energy_used = energy_used.max(Fixed64::ZERO);
        let fuel_burned = div_or_zero(energy_used, self.energy_per_fuel());
        let mut remaining = (self.fuel - fuel_burned).max(Fixed64::ZERO);
        if fuel_burned > Fixed64::ZERO && remaining < FUEL_EPSILON {
            remaining = Fixed64::ZERO;
        }
        self.fuel = remaining;

        if self.fuel != before {
            self.base.mark_dirty(FieldKey::Fuel);
        }
        self.set_running(energy_used > Fixed64::ZERO);
        merged - remaining
    }

    /// Queue fuel for the next merge, clipped to the remaining headroom.
    /// Returns the amount accepted.
    pub fn add_fuel(&mut self, amount: Fixed64) -> Fixed64 {
        let headroom = (self.fuel_capacity - self.fuel - self.pending_fuel).max(Fixed64::ZERO);
        let accepted = amount.max(Fixed64::ZERO).min(headroom);
        if accepted > Fixed64::ZERO {
            self.pending_fuel += accepted;
            self.base.mark_dirty(FieldKey::Fuel);
        }
        accepted
    }
}

impl PersistedNode for SourceNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn kind_fields(&self) -> &'static [FieldKey] {
        SOURCE_FIELDS
    }

    fn kind_field_value(&self, key: FieldKey) -> Option<FieldValue> {
        match key {
            // Pending fuel is already stored in the hopper; persist the total.
            FieldKey::Fuel => Some((self.fuel + self.pending_fuel).into()),
            FieldKey::FuelCapacity => Some(self.fuel_capacity.into()),
            FieldKey::FuelType => Some(self.fuel_type.code().into()),
            FieldKey::IsRunning => Some(self.is_running.into()),
            _ => None,
        }
    }

    fn apply_kind_field(&mut self, key: FieldKey, value: &FieldValue) -> Result<(), FieldError> {
        match key {
            FieldKey::Fuel => {
                let fuel = value.as_fixed().ok_or(FieldError::TypeMismatch { key })?;
                self.fuel = fuel.max(Fixed64::ZERO).min(self.fuel_capacity);
                self.pending_fuel = Fixed64::ZERO;
            }
            FieldKey::FuelCapacity => {
                let capacity = value.as_fixed().ok_or(FieldError::TypeMismatch { key })?;
                self.fuel_capacity = capacity.max(Fixed64::ZERO);
                self.fuel = self.fuel.min(self.fuel_capacity);
            }
            FieldKey::FuelType => {
                let code = value.as_int().ok_or(FieldError::TypeMismatch { key })?;
                let fuel_type = FuelType::try_from(code).map_err(|e| FieldError::Invalid {
                    key,
                    detail: e.to_string(),
                })?;
                self.fuel_type = fuel_type;
                self.fuel_efficiency = self.fuel_table.efficiency(fuel_type);
            }
            FieldKey::IsRunning => {
                self.is_running = value.as_bool().ok_or(FieldError::TypeMismatch { key })?;
            }
            _ => return Err(FieldError::NotPersisted { key }),
        }
        Ok(())
    }
}
