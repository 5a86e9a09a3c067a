//! Discrete-intensity energy sink representing a powered device.
//!
//! For consumers the base active flag means "currently powered". Whether
//! power is denied is always derived from `is_demanding && !is_active` and
//! never stored.

use eitrgrid_core::field::{FieldKey, FieldValue};
use eitrgrid_core::fixed::{Fixed64, approx_eq};
use eitrgrid_core::node::{FieldError, NodeBase, PersistedNode};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Intensity levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum PowerIntensity {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl PowerIntensity {
    pub const ALL: [PowerIntensity; 4] = [
        PowerIntensity::None,
        PowerIntensity::Low,
        PowerIntensity::Medium,
        PowerIntensity::High,
    ];

    /// Multiple of the base consumption drawn at this level.
    pub fn multiplier(self) -> i32 {
        match self {
            PowerIntensity::None => 0,
            PowerIntensity::Low => 1,
            PowerIntensity::Medium => 2,
            PowerIntensity::High => 4,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            PowerIntensity::None => 0,
            PowerIntensity::Low => 1,
            PowerIntensity::Medium => 2,
            PowerIntensity::High => 3,
        }
    }

    fn index(self) -> usize {
        self.code() as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("intensity level {0} is out of range")]
pub struct InvalidIntensity(pub i32);

impl TryFrom<i32> for PowerIntensity {
    type Error = InvalidIntensity;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        PowerIntensity::ALL
            .into_iter()
            .find(|level| level.code() == code)
            .ok_or(InvalidIntensity(code))
    }
}

// ---------------------------------------------------------------------------
// ConsumerNode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConsumerNode {
    base: NodeBase,
    base_power_consumption: Fixed64,
    /// Wattage per intensity level, indexed by `PowerIntensity::code`.
    wattage: [Fixed64; 4],
    intensity: PowerIntensity,
    is_demanding: bool,
    /// Intensity seen by the previous demand query, for detecting a
    /// transition out of `None`.
    last_requested: PowerIntensity,
}

const CONSUMER_FIELDS: &[FieldKey] = &[
    FieldKey::BasePowerConsumption,
    FieldKey::Intensity,
    FieldKey::IsDemanding,
];

fn wattage_table(base: Fixed64) -> [Fixed64; 4] {
    PowerIntensity::ALL.map(|level| base.saturating_mul(Fixed64::from_num(level.multiplier())))
}

impl ConsumerNode {
    /// A new consumer starts unpowered and idle.
    pub fn new(mut base: NodeBase, base_power_consumption: Fixed64) -> Self {
        base.set_active(false);
        base.clear_dirty();
        let base_power_consumption = base_power_consumption.max(Fixed64::ZERO);
        Self {
            base,
            base_power_consumption,
            wattage: wattage_table(base_power_consumption),
            intensity: PowerIntensity::None,
            is_demanding: false,
            last_requested: PowerIntensity::None,
        }
    }

    pub fn base_power_consumption(&self) -> Fixed64 {
        self.base_power_consumption
    }

    pub fn intensity(&self) -> PowerIntensity {
        self.intensity
    }

    pub fn is_demanding(&self) -> bool {
        self.is_demanding
    }

    /// Device currently receives power.
    pub fn is_powered(&self) -> bool {
        self.base.is_active()
    }

    pub fn is_power_denied(&self) -> bool {
        self.is_demanding && !self.base.is_active()
    }

    pub fn wattage(&self, level: PowerIntensity) -> Fixed64 {
        self.wattage[level.index()]
    }

    /// Energy wanted over `dt`; zero when not demanding.
    ///
    /// A device leaving `None` intensity while unpowered flips active here,
    /// so the allocation that follows sees it as a live consumer.
    pub fn get_requested_energy(&mut self, dt: Fixed64) -> Fixed64 {
        if !self.is_demanding {
            return Fixed64::ZERO;
        }
        let leaving_none =
            self.last_requested == PowerIntensity::None && self.intensity != PowerIntensity::None;
        self.last_requested = self.intensity;
        if leaving_none && !self.base.is_active() {
            self.base.set_active(true);
        }
        self.wattage(self.intensity).saturating_mul(dt)
    }

    pub fn set_power_mode(&mut self, level: PowerIntensity) {
        if self.intensity == level {
            return;
        }
        self.intensity = level;
        self.base.mark_dirty(FieldKey::Intensity);
    }

    pub fn set_base_power_consumption(&mut self, value: Fixed64) {
        let value = value.max(Fixed64::ZERO);
        if approx_eq(self.base_power_consumption, value) {
            return;
        }
        self.base_power_consumption = value;
        self.wattage = wattage_table(value);
        self.base.mark_dirty(FieldKey::BasePowerConsumption);
    }

    pub fn set_demanding(&mut self, demanding: bool) {
        if self.is_demanding == demanding {
            return;
        }
        self.is_demanding = demanding;
        self.base.mark_dirty(FieldKey::IsDemanding);
    }

    /// Record the allocation outcome. Returns `true` on a powered/unpowered
    /// transition.
    pub fn set_powered(&mut self, powered: bool) -> bool {
        self.base.set_active(powered)
    }
}

impl PersistedNode for ConsumerNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn kind_fields(&self) -> &'static [FieldKey] {
        CONSUMER_FIELDS
    }

    fn kind_field_value(&self, key: FieldKey) -> Option<FieldValue> {
        match key {
            FieldKey::BasePowerConsumption => Some(self.base_power_consumption.into()),
            FieldKey::Intensity => Some(self.intensity.code().into()),
            FieldKey::IsDemanding => Some(self.is_demanding.into()),
            _ => None,
        }
    }

    fn apply_kind_field(&mut self, key: FieldKey, value: &FieldValue) -> Result<(), FieldError> {
        match key {
            FieldKey::BasePowerConsumption => {
                let v = value.as_fixed().ok_or(FieldError::TypeMismatch { key })?;
                self.base_power_consumption = v.max(Fixed64::ZERO);
                self.wattage = wattage_table(self.base_power_consumption);
            }
            FieldKey::Intensity => {
                let code = value.as_int().ok_or(FieldError::TypeMismatch { key })?;
                self.intensity = PowerIntensity::try_from(code).map_err(|e| FieldError::Invalid {
                    key,
                    detail: e.to_string(),
                })?;
            }
            FieldKey::IsDemanding => {
                self.is_demanding = value.as_bool().ok_or(FieldError::TypeMismatch { key })?;
            }
            _ => return Err(FieldError::NotPersisted { key }),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eitrgrid_core::id::WorldObjectId;
    use eitrgrid_core::position::Position;
    use eitrgrid_core::test_utils::fixed;

    fn device(base_power: f64) -> ConsumerNode {
        let base = NodeBase::new(WorldObjectId(3), Position::default(), 8.0);
        ConsumerNode::new(base, fixed(base_power))
    }

    #[test]
    fn wattage_table_scales_by_level() {
        let node = device(2.0);
        assert_eq!(node.wattage(PowerIntensity::None), Fixed64::ZERO);
        assert_eq!(node.wattage(PowerIntensity::Low), fixed(2.0));
        assert_eq!(node.wattage(PowerIntensity::Medium), fixed(4.0));
        assert_eq!(node.wattage(PowerIntensity::High), fixed(8.0));
    }

    #[test]
    fn medium_request_over_one_second() {
        let mut node = device(2.0);
        node.set_demanding(true);
        node.set_power_mode(PowerIntensity::Medium);
        assert_eq!(node.get_requested_energy(fixed(1.0)), fixed(4.0));
    }

    #[test]
    fn not_demanding_requests_nothing() {
        let mut node = device(2.0);
        node.set_power_mode(PowerIntensity::High);
        assert_eq!(node.get_requested_energy(fixed(1.0)), Fixed64::ZERO);
        assert!(!node.is_powered());
    }

    #[test]
    fn leaving_none_auto_activates_once() {
        let mut node = device(2.0);
        node.set_demanding(true);
        assert_eq!(node.get_requested_energy(fixed(1.0)), Fixed64::ZERO);
        assert!(!node.is_powered());

        node.set_power_mode(PowerIntensity::Low);
        node.get_requested_energy(fixed(1.0));
        assert!(node.is_powered());

        // Denied by the grid; staying at Low does not re-activate.
        node.set_powered(false);
        node.get_requested_energy(fixed(1.0));
        assert!(!node.is_powered());
        assert!(node.is_power_denied());
    }

    #[test]
    fn power_denied_is_derived() {
        let mut node = device(1.0);
        assert!(!node.is_power_denied());
        node.set_demanding(true);
        assert!(node.is_power_denied());
        node.set_powered(true);
        assert!(!node.is_power_denied());
        node.set_demanding(false);
        assert!(!node.is_power_denied());
    }

    #[test]
    fn set_power_mode_marks_only_on_change() {
        let mut node = device(1.0);
        node.set_power_mode(PowerIntensity::None);
        assert!(!node.base().is_dirty());
        node.set_power_mode(PowerIntensity::High);
        assert!(node.base().dirty_fields().contains(FieldKey::Intensity));
    }

    #[test]
    fn base_power_change_is_tolerant() {
        let mut node = device(2.0);
        node.set_base_power_consumption(fixed(2.0001));
        assert!(!node.base().is_dirty());
        node.set_base_power_consumption(fixed(3.0));
        assert!(node.base().dirty_fields().contains(FieldKey::BasePowerConsumption));
        assert_eq!(node.wattage(PowerIntensity::High), fixed(12.0));
    }

    #[test]
    fn intensity_codes_are_validated() {
        assert_eq!(PowerIntensity::try_from(2), Ok(PowerIntensity::Medium));
        assert_eq!(PowerIntensity::try_from(4), Err(InvalidIntensity(4)));

        let mut node = device(1.0);
        let err = node.apply_field(FieldKey::Intensity, &FieldValue::Int(-1)).unwrap_err();
        assert!(matches!(err, FieldError::Invalid { .. }));
        assert_eq!(node.intensity(), PowerIntensity::None);
    }
}
