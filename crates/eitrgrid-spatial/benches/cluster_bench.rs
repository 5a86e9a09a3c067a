//! Criterion benchmarks for proximity clustering.

use criterion::{Criterion, criterion_group, criterion_main};
use eitrgrid_core::node::NodeBase;
use eitrgrid_core::test_utils::*;
use eitrgrid_power::{NodeRegistry, PylonNode, StorageNode};
use eitrgrid_spatial::{ClusterIndex, ProximityClusterer};
use std::hint::black_box;

/// A grid of 20 x 20 islands, each a battery and a pylon.
fn build_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    let mut next = 0u64;
    for gx in 0..20 {
        for gz in 0..20 {
            let (x, z) = (gx as f32 * 50.0, gz as f32 * 50.0);
            next += 1;
            registry.insert(StorageNode::new(NodeBase::new(world(next), pos(x, z), 8.0), fixed(100.0)).into());
            next += 1;
            registry.insert(PylonNode::new(NodeBase::new(world(next), pos(x + 6.0, z), 12.0)).into());
        }
    }
    registry
}

fn bench_rebuild(c: &mut Criterion) {
    let mut registry = build_registry();
    let mut index = ProximityClusterer::new();

    c.bench_function("rebuild_800_nodes", |b| {
        b.iter(|| {
            index.rebuild(&mut registry);
            black_box(index.network_count());
        });
    });
}

criterion_group!(benches, bench_rebuild);
criterion_main!(benches);
