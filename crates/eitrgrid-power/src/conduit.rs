//! Bridge between the grid and nearby characters' eitr pools.
//!
//! In [`ConduitMode::Charge`] the conduit is a consumer: grid energy becomes
//! eitr granted to characters. In [`ConduitMode::Drain`] it is a producer:
//! eitr spent by characters becomes grid energy. One unit of energy is worth
//! `regen_cost` eitr in both directions.
//!
//! The conduit never touches a character directly. [`ConduitNode::simulate_conduit`]
//! returns [`EitrCommand`]s that the caller applies to the character system,
//! and updates its own ledger so repeated estimates stay honest until the
//! next eitr offer arrives.
//!
//! Transfers are gated by a real-time accumulator: estimates may be polled
//! every frame, but eitr only moves once per interval.

use eitrgrid_core::config::ConduitConfig;
use eitrgrid_core::field::{FieldKey, FieldValue};
use eitrgrid_core::fixed::{Fixed64, div_or_zero, f64_to_fixed64};
use eitrgrid_core::id::CharacterId;
use eitrgrid_core::node::{FieldError, NodeBase, PersistedNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConduitMode {
    #[default]
    Charge,
    Drain,
}

impl ConduitMode {
    pub fn code(self) -> i32 {
        match self {
            ConduitMode::Charge => 0,
            ConduitMode::Drain => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("conduit mode {0} is out of range")]
pub struct InvalidConduitMode(pub i32);

impl TryFrom<i32> for ConduitMode {
    type Error = InvalidConduitMode;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ConduitMode::Charge),
            1 => Ok(ConduitMode::Drain),
            other => Err(InvalidConduitMode(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Economy and ledger
// ---------------------------------------------------------------------------

/// Fixed-point form of [`ConduitConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConduitEconomy {
    pub energy_per_interval: Fixed64,
    pub regen_cost: Fixed64,
    pub noise_floor: Fixed64,
    pub max_fill_ratio: Fixed64,
    pub interval: Fixed64,
}

impl From<&ConduitConfig> for ConduitEconomy {
    fn from(config: &ConduitConfig) -> Self {
        Self {
            energy_per_interval: f64_to_fixed64(config.energy_per_interval),
            regen_cost: f64_to_fixed64(config.regen_cost),
            noise_floor: f64_to_fixed64(config.noise_floor),
            max_fill_ratio: f64_to_fixed64(config.max_fill_ratio),
            interval: f64_to_fixed64(config.interval_seconds),
        }
    }
}

impl Default for ConduitEconomy {
    fn default() -> Self {
        Self::from(&ConduitConfig::default())
    }
}

/// Last reported eitr snapshot of one character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EitrEntry {
    pub eitr: Fixed64,
    pub capacity: Fixed64,
}

impl EitrEntry {
    pub fn headroom(&self) -> Fixed64 {
        (self.capacity - self.eitr).max(Fixed64::ZERO)
    }
}

/// A resource change for the character system to apply. Positive deltas
/// grant eitr, negative deltas spend it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EitrCommand {
    pub character: CharacterId,
    pub delta: Fixed64,
}

/// What one gated run of the conduit did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConduitOutcome {
    /// Energy consumed (Charge) or produced (Drain).
    pub energy: Fixed64,
    pub commands: Vec<EitrCommand>,
}

// ---------------------------------------------------------------------------
// ConduitNode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConduitNode {
    base: NodeBase,
    mode: ConduitMode,
    economy: ConduitEconomy,
    /// Ordered by character id, so removing and re-adding an entry restores
    /// the same drain order.
    ledger: BTreeMap<CharacterId, EitrEntry>,
    accumulated: Fixed64,
}

const CONDUIT_FIELDS: &[FieldKey] = &[FieldKey::ConduitMode];

impl ConduitNode {
    pub fn new(base: NodeBase, mode: ConduitMode, economy: ConduitEconomy) -> Self {
        Self {
            base,
            mode,
            economy,
            ledger: BTreeMap::new(),
            accumulated: Fixed64::ZERO,
        }
    }

    pub fn mode(&self) -> ConduitMode {
        self.mode
    }

    pub fn economy(&self) -> &ConduitEconomy {
        &self.economy
    }

    pub fn set_mode(&mut self, mode: ConduitMode) {
        if self.mode != mode {
            self.mode = mode;
            self.base.mark_dirty(FieldKey::ConduitMode);
        }
    }

    // -- Ledger ------------------------------------------------------------

    pub fn add_or_update(&mut self, character: CharacterId, eitr: Fixed64, capacity: Fixed64) {
        let capacity = capacity.max(Fixed64::ZERO);
        let eitr = eitr.max(Fixed64::ZERO).min(capacity);
        self.ledger.insert(character, EitrEntry { eitr, capacity });
    }

    pub fn remove_player(&mut self, character: CharacterId) -> Option<EitrEntry> {
        self.ledger.remove(&character)
    }

    /// Drop every character `keep` rejects. Returns how many were removed.
    pub fn retain_players(&mut self, mut keep: impl FnMut(CharacterId) -> bool) -> usize {
        let before = self.ledger.len();
        self.ledger.retain(|&character, _| keep(character));
        before - self.ledger.len()
    }

    pub fn entry(&self, character: CharacterId) -> Option<&EitrEntry> {
        self.ledger.get(&character)
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }

    fn is_chargeable(&self, entry: &EitrEntry) -> bool {
        entry.eitr > self.economy.noise_floor
            && entry.eitr < self.economy.max_fill_ratio * entry.capacity
            && entry.capacity > self.economy.regen_cost
    }

    fn is_drainable(&self, entry: &EitrEntry) -> bool {
        entry.eitr > self.economy.noise_floor
    }

    /// Characters eligible for the current mode, in ledger order.
    pub fn eligible(&self) -> Vec<CharacterId> {
        self.ledger
            .iter()
            .filter(|(_, entry)| match self.mode {
                ConduitMode::Charge => self.is_chargeable(entry),
                ConduitMode::Drain => self.is_drainable(entry),
            })
            .map(|(id, _)| *id)
            .collect()
    }

    fn eligible_count(&self) -> Fixed64 {
        Fixed64::from_num(self.eligible().len() as i32)
    }

    // -- Estimates ---------------------------------------------------------

    /// Grid energy the conduit could absorb in Charge mode.
    pub fn estimate_total_demand(&self, _dt: Fixed64) -> Fixed64 {
        if self.mode != ConduitMode::Charge || !self.base.is_active() {
            return Fixed64::ZERO;
        }
        let headroom: Fixed64 = self
            .eligible()
            .iter()
            .filter_map(|id| self.ledger.get(id))
            .map(EitrEntry::headroom)
            .fold(Fixed64::ZERO, Fixed64::saturating_add);
        div_or_zero(headroom, self.economy.regen_cost)
            .min(self.eligible_count().saturating_mul(self.economy.energy_per_interval))
    }

    /// Grid energy the conduit could produce in Drain mode. The result is
    /// energy, not eitr: the eligible pool is divided by `regen_cost`, the
    /// same rate used for charging.
    pub fn estimate_total_supply(&self, _dt: Fixed64) -> Fixed64 {
        if self.mode != ConduitMode::Drain || !self.base.is_active() {
            return Fixed64::ZERO;
        }
        let pool: Fixed64 = self
            .eligible()
            .iter()
            .filter_map(|id| self.ledger.get(id))
            .map(|entry| entry.eitr)
            .fold(Fixed64::ZERO, Fixed64::saturating_add);
        div_or_zero(pool, self.economy.regen_cost)
            .min(self.eligible_count().saturating_mul(self.economy.energy_per_interval))
    }

    // -- Gate --------------------------------------------------------------

    pub fn update_simulation_time(&mut self, dt: Fixed64) {
        // At most one run of backlog survives a stall.
        let cap = self.economy.interval * Fixed64::from_num(2);
        self.accumulated = (self.accumulated + dt.max(Fixed64::ZERO)).min(cap);
    }

    pub fn can_run_simulation(&self) -> bool {
        self.accumulated >= self.economy.interval
    }

    // -- Transfer ----------------------------------------------------------

    /// Move eitr for `energy_budget` worth of grid energy, if the gate is
    /// open. Returns the energy consumed (Charge) or produced (Drain) plus
    /// the commands for the character system.
    pub fn simulate_conduit(&mut self, energy_budget: Fixed64, _dt: Fixed64) -> ConduitOutcome {
        if !self.can_run_simulation() {
            return ConduitOutcome::default();
        }
        self.accumulated -= self.economy.interval;
        if !self.base.is_active() || energy_budget <= Fixed64::ZERO {
            return ConduitOutcome::default();
        }
        match self.mode {
            ConduitMode::Charge => self.charge(energy_budget),
            ConduitMode::Drain => self.drain(energy_budget),
        }
    }

    fn charge(&mut self, energy_budget: Fixed64) -> ConduitOutcome {
        let eligible = self.eligible();
        if eligible.is_empty() {
            return ConduitOutcome::default();
        }
        let regen_cost = self.economy.regen_cost;
        let max_recharge = energy_budget.saturating_mul(regen_cost);
        let per_character = (max_recharge / Fixed64::from_num(eligible.len() as i32))
            .min(self.economy.energy_per_interval.saturating_mul(regen_cost));

        let mut granted_total = Fixed64::ZERO;
        let mut commands = Vec::with_capacity(eligible.len());
        for id in eligible {
            let Some(entry) = self.ledger.get_mut(&id) else {
                continue;
            };
            let grant = per_character.min(entry.headroom());
            if grant <= Fixed64::ZERO {
                continue;
            }
            entry.eitr += grant;
            granted_total = granted_total.saturating_add(grant);
            commands.push(EitrCommand {
                character: id,
                delta: grant,
            });
        }

        let energy = if granted_total == max_recharge {
            energy_budget
        } else {
            div_or_zero(granted_total, regen_cost).min(energy_budget)
        };
        ConduitOutcome { energy, commands }
    }

    fn drain(&mut self, energy_budget: Fixed64) -> ConduitOutcome {
        let regen_cost = self.economy.regen_cost;
        let wanted = energy_budget.saturating_mul(regen_cost);
        let mut remaining = wanted;
        let mut commands = Vec::new();
        for id in self.eligible() {
            if remaining <= Fixed64::ZERO {
                break;
            }
            let Some(entry) = self.ledger.get_mut(&id) else {
                continue;
            };
            let take = entry.eitr.min(remaining);
            if take <= Fixed64::ZERO {
                continue;
            }
            entry.eitr -= take;
            remaining -= take;
            commands.push(EitrCommand {
                character: id,
                delta: -take,
            });
        }

        let spent = wanted - remaining;
        let energy = if remaining <= Fixed64::ZERO {
            energy_budget
        } else {
            div_or_zero(spent, regen_cost)
        };
        ConduitOutcome { energy, commands }
    }
}

impl PersistedNode for ConduitNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn kind_fields(&self) -> &'static [FieldKey] {
        CONDUIT_FIELDS
    }

    fn kind_field_value(&self, key: FieldKey) -> Option<FieldValue> {
        match key {
            FieldKey::ConduitMode => Some(self.mode.code().into()),
            _ => None,
        }
    }

    fn apply_kind_field(&mut self, key: FieldKey, value: &FieldValue) -> Result<(), FieldError> {
        match key {
            FieldKey::ConduitMode => {
                let code = value.as_int().ok_or(FieldError::TypeMismatch { key })?;
                self.mode = ConduitMode::try_from(code).map_err(|e| FieldError::Invalid {
                    key,
                    detail: e.to_string(),
                })?;
                Ok(())
            }
            _ => Err(FieldError::NotPersisted { key }),
        }
    }
}
