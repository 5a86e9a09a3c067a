//! Dirty-field replication.
//!
//! The authority never ships field values. A replication pass writes each
//! dirty node's changed fields into its persisted record, then tells every
//! peer standing near the affected network "these ids changed, reload
//! them". Receivers re-read the records, so a notification delivered twice
//! does no harm.

use crate::transport::PeerMessenger;
use crate::wire::{self, GridMessage};
use eitrgrid_core::config::ReplicationConfig;
use eitrgrid_core::fixed::{Fixed64, f64_to_fixed64};
use eitrgrid_core::id::{NetworkId, WorldObjectId};
use eitrgrid_core::node::PersistedNode;
use eitrgrid_core::position::Position;
use eitrgrid_core::record::{RecordStore, WorldRecord};
use eitrgrid_power::{NodeKind, NodeRegistry};
use std::collections::BTreeMap;
use tracing::{debug, error, warn};

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Runs the replication pass on its own clock, independent of the tick rate.
#[derive(Debug, Clone)]
pub struct ReplicationScheduler {
    interval: Fixed64,
    accumulated: Fixed64,
}

impl ReplicationScheduler {
    pub fn new(interval: Fixed64) -> Self {
        Self {
            interval: interval.max(Fixed64::DELTA),
            accumulated: Fixed64::ZERO,
        }
    }

    pub fn from_config(config: &ReplicationConfig) -> Self {
        Self::new(f64_to_fixed64(config.interval_seconds))
    }

    pub fn interval(&self) -> Fixed64 {
        self.interval
    }

    /// Advance by `dt`. Returns `true` when a pass is due. A long stall
    /// yields one pass, not a burst.
    pub fn update(&mut self, dt: Fixed64) -> bool {
        self.accumulated += dt.max(Fixed64::ZERO);
        if self.accumulated < self.interval {
            return false;
        }
        self.accumulated = (self.accumulated - self.interval).min(self.interval);
        true
    }
}

// ---------------------------------------------------------------------------
// Replicator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicationSummary {
    /// Nodes whose dirty fields were written to their records.
    pub flushed: usize,
    /// Networks with at least one flushed node.
    pub networks: usize,
    /// Changed-ids messages sent, one per (network, peer) pair in range.
    pub notifications: usize,
}

/// Kinds whose position anchors a network for range filtering.
fn anchors_network(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Source | NodeKind::Storage | NodeKind::Conduit | NodeKind::Pylon
    )
}

#[derive(Debug, Clone)]
pub struct Replicator {
    radius: f32,
}

impl Replicator {
    pub fn new(radius: f32) -> Self {
        Self {
            radius: radius.max(0.0),
        }
    }

    pub fn from_config(config: &ReplicationConfig) -> Self {
        Self::new(config.radius)
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Flush every dirty node into `store`, clear its dirty set, and notify
    /// peers within range of each affected network.
    pub fn replicate<S: RecordStore, M: PeerMessenger>(
        &self,
        registry: &mut NodeRegistry,
        store: &mut S,
        messenger: &mut M,
    ) -> ReplicationSummary {
        let local = messenger.local_peer();
        let mut summary = ReplicationSummary::default();
        let mut batches: BTreeMap<NetworkId, Vec<(WorldObjectId, Position)>> = BTreeMap::new();

        for id in registry.take_dirty_nodes() {
            let Some(node) = registry.get_mut(id) else {
                continue;
            };
            let world = node.world_object();
            if store.record(world).is_none() {
                store.insert(WorldRecord::new(world));
            }
            let Some(record) = store.record_mut(world) else {
                continue;
            };
            if node.flush_dirty(record, local) {
                summary.flushed += 1;
            }
            node.base_mut().clear_dirty();
            batches
                .entry(node.network_id().clone())
                .or_default()
                .push((world, node.position()));
        }
        if batches.is_empty() {
            return summary;
        }
        summary.networks = batches.len();

        let mut anchors: BTreeMap<&NetworkId, Vec<Position>> = BTreeMap::new();
        for (_, node) in registry.iter() {
            if anchors_network(node.kind()) && batches.contains_key(node.network_id()) {
                anchors.entry(node.network_id()).or_default().push(node.position());
            }
        }

        let peers = messenger.peers();
        for (network, changed) in &batches {
            let mut points: Vec<Position> = anchors.get(network).cloned().unwrap_or_default();
            points.extend(changed.iter().map(|&(_, at)| at));

            let message = GridMessage::ChangedIds {
                network_id: network.clone(),
                ids: changed.iter().map(|&(world, _)| world).collect(),
            };
            let payload = match wire::encode(&message) {
                Ok(payload) => payload,
                Err(err) => {
                    error!(network = %network, %err, "failed to encode changed ids");
                    continue;
                }
            };
            for peer in &peers {
                if points.iter().any(|p| p.within(&peer.position, self.radius)) {
                    messenger.send(peer.id, payload.clone());
                    summary.notifications += 1;
                }
            }
            debug!(network = %network, changed = changed.len(), "replicated network");
        }
        summary
    }
}

// ---------------------------------------------------------------------------
// Receiving
// ---------------------------------------------------------------------------

/// Reload each listed node from its persisted record. Ids with no local node
/// or no record are logged and skipped. Returns the number reloaded.
pub fn apply_changed_ids<S: RecordStore>(
    registry: &mut NodeRegistry,
    store: &S,
    network: &NetworkId,
    ids: &[WorldObjectId],
) -> usize {
    let mut reloaded = 0;
    for &world in ids {
        let Some(id) = registry.lookup(world) else {
            warn!(node = ?world, network = %network, "changed id is not registered here");
            continue;
        };
        let Some(record) = store.record(world) else {
            warn!(node = ?world, network = %network, "changed id has no record");
            continue;
        };
        if let Some(node) = registry.get_mut(id) {
            node.load(record);
            reloaded += 1;
        }
    }
    reloaded
}
