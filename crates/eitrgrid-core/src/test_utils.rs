//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]`.

use crate::fixed::Fixed64;
use crate::id::*;
use crate::position::Position;
use slotmap::SlotMap;

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

pub fn pos(x: f32, z: f32) -> Position {
    Position::new(x, 0.0, z)
}

pub fn world(id: u64) -> WorldObjectId {
    WorldObjectId(id)
}

pub fn net(name: &str) -> NetworkId {
    NetworkId::new(name)
}

pub fn make_node_ids(count: usize) -> Vec<NodeId> {
    let mut sm = SlotMap::<NodeId, ()>::with_key();
    (0..count).map(|_| sm.insert(())).collect()
}

/// Assert two fixed-point values agree within `tolerance`.
pub fn assert_close(actual: Fixed64, expected: Fixed64, tolerance: f64) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= Fixed64::from_num(tolerance),
        "expected {expected}, got {actual} (diff {diff})"
    );
}
