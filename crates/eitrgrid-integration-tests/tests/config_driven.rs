//! Sessions configured from a data directory.

use eitrgrid_core::config::{FuelTable, FuelType};
use eitrgrid_core::id::{CharacterId, PeerId};
use eitrgrid_core::node::NodeBase;
use eitrgrid_core::record::MemoryRecordStore;
use eitrgrid_core::test_utils::*;
use eitrgrid_data::load_grid_config;
use eitrgrid_net::*;
use eitrgrid_power::*;
use std::fs;
use std::path::PathBuf;

fn data_dir(suffix: &str, contents: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "eitrgrid_integration_{suffix}_{}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("grid.toml"), contents).unwrap();
    dir
}

#[test]
fn configured_radius_limits_notifications() {
    let dir = data_dir(
        "radius",
        r#"
[replication]
radius = 5.0
interval_seconds = 0.25
"#,
    );
    let config = load_grid_config(&dir).unwrap();
    let _ = fs::remove_dir_all(&dir);

    let hub = MemoryHub::new();
    let mut authority = GridPeer::new(
        PeerRole::Authority,
        hub.connect(PeerId(1), pos(0.0, 0.0)),
        MemoryRecordStore::new(),
        config.clone(),
    );
    hub.connect(PeerId(2), pos(4.0, 0.0));
    hub.connect(PeerId(3), pos(10.0, 0.0));

    let battery = StorageNode::new(NodeBase::new(world(1), pos(0.0, 0.0), 4.0), fixed(10.0));
    authority.load_node(battery.into());

    let tick = authority.tick(fixed(0.25));
    let summary = tick.replication.expect("configured interval elapsed");
    assert_eq!(summary.notifications, 1);
    assert_eq!(hub.pending_for(PeerId(2)), 1);
    assert_eq!(hub.pending_for(PeerId(3)), 0);
}

#[test]
fn configured_fuel_efficiency_stretches_fuel() {
    let dir = data_dir(
        "fuel",
        r#"
[fuel_types]
coal = 2.0
"#,
    );
    let config = load_grid_config(&dir).unwrap();
    let _ = fs::remove_dir_all(&dir);
    assert_eq!(config.fuel_types.efficiency(FuelType::Coal), fixed(2.0));

    let hub = MemoryHub::new();
    let mut peer = GridPeer::new(
        PeerRole::Authority,
        hub.connect(PeerId(1), pos(0.0, 0.0)),
        MemoryRecordStore::new(),
        config.clone(),
    );
    let spec = SourceSpec {
        fuel_capacity: fixed(10.0),
        output_rate: fixed(10.0),
        fuel_consumption_rate: fixed(1.0),
        fuel_energy_yield: fixed(10.0),
        fuel_type: FuelType::Coal,
    };
    let furnace = SourceNode::new(NodeBase::new(world(1), pos(0.0, 0.0), 8.0), spec, &config.fuel_types);
    peer.load_node(furnace.into());
    let lamp = ConsumerNode::new(NodeBase::new(world(2), pos(1.0, 0.0), 8.0), fixed(5.0));
    peer.load_node(lamp.into());

    peer.request_fuel(world(1), 1).unwrap();
    peer.send_consumer_state(world(2), true, fixed(5.0), PowerIntensity::Low)
        .unwrap();
    peer.tick(fixed(1.0));
    let tick = peer.tick(fixed(1.0));

    // 5 energy at 10 yield and 2x efficiency burns a quarter unit.
    assert_close(tick.reports[0].fuel_burned, fixed(0.25), 1e-3);
    assert_eq!(tick.reports[0].deficit, fixed(0.0));

    // The default table would have burned twice as much.
    assert_eq!(FuelTable::default().efficiency(FuelType::Coal), fixed(1.0));
}

#[test]
fn configured_conduit_economy_reaches_the_ledger() {
    let dir = data_dir(
        "conduit",
        r#"
[conduit]
regen_cost = 20.0
energy_per_interval = 0.5
"#,
    );
    let config = load_grid_config(&dir).unwrap();
    let _ = fs::remove_dir_all(&dir);

    let economy = ConduitEconomy::from(&config.conduit);
    let mut conduit = ConduitNode::new(
        NodeBase::new(world(9), pos(0.0, 0.0), 8.0),
        ConduitMode::Charge,
        economy,
    );
    conduit.add_or_update(CharacterId(1), fixed(10.0), fixed(100.0));
    // min(90 / 20, 1 * 0.5)
    assert_eq!(conduit.estimate_total_demand(fixed(1.0)), fixed(0.5));
}
