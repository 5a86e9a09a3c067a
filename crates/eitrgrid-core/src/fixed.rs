use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits. Every energy,
/// fuel, eitr and time quantity in the simulation uses this type so that
/// all peers compute bit-identical results.
pub type Fixed64 = I32F32;

/// Fuel below this amount snaps to exactly zero after a commit.
pub const FUEL_EPSILON: Fixed64 = Fixed64::from_bits(429_497); // ~1e-4

/// Tolerance for deciding whether a configured wattage actually changed.
pub const POWER_EPSILON: Fixed64 = Fixed64::from_bits(4_294_967); // ~1e-3

/// Storage peeks are rounded to this many units per whole (3 decimals).
const PEEK_PRECISION: i32 = 1000;

/// Convert an f32 (wire or config value) to Fixed64. Never used in the sim loop.
#[inline]
pub fn f32_to_fixed64(v: f32) -> Fixed64 {
    if v.is_nan() {
        return Fixed64::ZERO;
    }
    Fixed64::saturating_from_num(v)
}

/// Convert Fixed64 to f32 for the wire or for display.
#[inline]
pub fn fixed64_to_f32(v: Fixed64) -> f32 {
    v.to_num::<f32>()
}

/// Convert an f64 to Fixed64. Use only for initialization.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    if v.is_nan() {
        return Fixed64::ZERO;
    }
    Fixed64::saturating_from_num(v)
}

/// Convert Fixed64 to f64. Use only for display.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Round to the fixed peek precision (three decimal places), never above `v`
/// itself so a rounded grant cannot exceed the value it was taken from.
pub fn round_to_precision(v: Fixed64) -> Fixed64 {
    let scale = Fixed64::from_num(PEEK_PRECISION);
    (v.saturating_mul(scale).saturating_round() / scale).min(v)
}

/// Division that yields zero instead of panicking on a zero divisor.
#[inline]
pub fn div_or_zero(a: Fixed64, b: Fixed64) -> Fixed64 {
    a.checked_div(b).unwrap_or(Fixed64::ZERO)
}

/// `true` when `a` and `b` differ by less than [`POWER_EPSILON`].
#[inline]
pub fn approx_eq(a: Fixed64, b: Fixed64) -> bool {
    (a - b).abs() < POWER_EPSILON
}
