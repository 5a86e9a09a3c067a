use serde::{Deserialize, Serialize};

/// A world-space position. Geometry stays in `f32`; it never feeds the
/// energy math.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_squared(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn distance(&self, other: &Position) -> f32 {
        self.distance_squared(other).sqrt()
    }

    /// `true` if `other` lies within `radius` (inclusive).
    pub fn within(&self, other: &Position, radius: f32) -> bool {
        self.distance_squared(other) <= radius * radius
    }
}
