//! Criterion benchmarks for the network simulation step.
//!
//! Two benchmark groups:
//! - `mixed_network`: one network with sources, batteries, consumers and
//!   conduits in both modes
//! - `many_networks`: 200 small networks stepped in one tick

use criterion::{Criterion, criterion_group, criterion_main};
use eitrgrid_core::config::{FuelTable, FuelType};
use eitrgrid_core::fixed::Fixed64;
use eitrgrid_core::id::CharacterId;
use eitrgrid_core::node::NodeBase;
use eitrgrid_core::test_utils::*;
use eitrgrid_power::*;
use std::hint::black_box;

// ===========================================================================
// Network builders
// ===========================================================================

struct Builder {
    registry: NodeRegistry,
    next_world: u64,
}

impl Builder {
    fn new() -> Self {
        Self {
            registry: NodeRegistry::new(),
            next_world: 0,
        }
    }

    fn base(&mut self) -> NodeBase {
        self.next_world += 1;
        NodeBase::new(world(self.next_world), pos(0.0, 0.0), 8.0)
    }

    /// Sources, batteries, consumers and conduits in a 1:1:4:1 mix.
    fn network(&mut self, name: &str, groups: usize) -> SimulationBundle {
        let mut bundle = SimulationBundle::new(net(name), fixed(1.0 / 30.0));
        let fuels = FuelTable::default();
        for g in 0..groups {
            let spec = SourceSpec {
                fuel_capacity: fixed(1_000.0),
                output_rate: fixed(40.0),
                fuel_consumption_rate: fixed(1.0),
                fuel_energy_yield: fixed(50.0),
                fuel_type: FuelType::Coal,
            };
            let mut source = SourceNode::new(self.base(), spec, &fuels);
            source.add_fuel(fixed(1_000.0));
            source.commit_energy_used(Fixed64::ZERO);
            let id = self.registry.insert(source.into());
            bundle.push(id, NodeKind::Source);

            let mut battery = StorageNode::new(self.base(), fixed(200.0));
            battery.add_energy(fixed(100.0));
            let id = self.registry.insert(battery.into());
            bundle.push(id, NodeKind::Storage);

            for level in [PowerIntensity::Low, PowerIntensity::Medium, PowerIntensity::High, PowerIntensity::Low] {
                let mut consumer = ConsumerNode::new(self.base(), fixed(2.0));
                consumer.set_demanding(true);
                consumer.set_power_mode(level);
                let id = self.registry.insert(consumer.into());
                bundle.push(id, NodeKind::Consumer);
            }

            let mode = if g % 2 == 0 { ConduitMode::Charge } else { ConduitMode::Drain };
            let mut conduit = ConduitNode::new(self.base(), mode, ConduitEconomy::default());
            for c in 0..4 {
                conduit.add_or_update(CharacterId((g * 4 + c) as i64), fixed(40.0), fixed(100.0));
            }
            let id = self.registry.insert(conduit.into());
            bundle.push(id, NodeKind::Conduit);
        }
        bundle
    }
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_mixed_network(c: &mut Criterion) {
    let mut builder = Builder::new();
    let bundle = builder.network("mixed", 100);
    let mut registry = builder.registry;
    let mut sim = GridSimulator::new();

    c.bench_function("mixed_network_700_nodes", |b| {
        b.iter(|| {
            let reports = sim.tick(&mut registry, std::iter::once(&bundle));
            black_box(reports);
        });
    });
}

fn bench_many_networks(c: &mut Criterion) {
    let mut builder = Builder::new();
    let bundles: Vec<SimulationBundle> = (0..200)
        .map(|i| builder.network(&format!("net-{i}"), 2))
        .collect();
    let mut registry = builder.registry;
    let mut sim = GridSimulator::new();

    c.bench_function("many_networks_200x14", |b| {
        b.iter(|| {
            let reports = sim.tick(&mut registry, &bundles);
            black_box(reports);
        });
    });
}

criterion_group!(benches, bench_mixed_network, bench_many_networks);
criterion_main!(benches);
