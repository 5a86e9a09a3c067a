//! Spatial clustering of power nodes into networks.
//!
//! The simulation only ever sees one [`SimulationBundle`] per network per
//! tick; this crate decides which nodes form a network. Two nodes are
//! connected when the distance between them is within the larger of their
//! two connection ranges. Connection is transitive, so a chain of pylons
//! carries a network across distances no single node could span.
//!
//! Network ids are derived from the lowest world-object id in each cluster,
//! so rebuilding the same layout on any peer yields the same ids.

use eitrgrid_core::fixed::Fixed64;
use eitrgrid_core::id::{NetworkId, NodeId, WorldObjectId};
use eitrgrid_core::node::PersistedNode;
use eitrgrid_power::{NodeRegistry, SimulationBundle};
use std::collections::BTreeMap;
use tracing::debug;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from bundle construction. Any of them means the caller should
/// rebuild the whole index before the next tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterError {
    #[error("network {0} is not in the cluster index")]
    UnknownNetwork(NetworkId),
    #[error("network {network} lists node {node:?} which is no longer registered")]
    StaleMember { network: NetworkId, node: NodeId },
}

// ---------------------------------------------------------------------------
// Collaborator contract
// ---------------------------------------------------------------------------

/// Groups registered nodes into networks and hands out per-tick bundles.
pub trait ClusterIndex {
    /// Recompute every cluster and write the resulting network id onto each
    /// node.
    fn rebuild(&mut self, registry: &mut NodeRegistry);

    /// Known networks, in id order.
    fn networks(&self) -> Vec<NetworkId>;

    fn build_network_simulation_bundle(
        &self,
        registry: &NodeRegistry,
        network: &NetworkId,
        delta_time: Fixed64,
    ) -> Result<SimulationBundle, ClusterError>;

    /// Rebuild only when registry membership has changed.
    fn refresh(&mut self, registry: &mut NodeRegistry) -> bool {
        if !registry.is_topology_dirty() {
            return false;
        }
        self.rebuild(registry);
        true
    }
}

// ---------------------------------------------------------------------------
// Union-find
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ProximityClusterer
// ---------------------------------------------------------------------------

/// Prefix of generated network ids.
pub const NETWORK_PREFIX: &str = "grid";

/// Clusters nodes by connection range.
#[derive(Debug, Default)]
pub struct ProximityClusterer {
    members: BTreeMap<NetworkId, Vec<NodeId>>,
    by_node: BTreeMap<NodeId, NetworkId>,
}

impl ProximityClusterer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn network_of(&self, node: NodeId) -> Option<&NetworkId> {
        self.by_node.get(&node)
    }

    pub fn members(&self, network: &NetworkId) -> Option<&[NodeId]> {
        self.members.get(network).map(Vec::as_slice)
    }

    pub fn network_count(&self) -> usize {
        self.members.len()
    }

    fn network_name(anchor: WorldObjectId) -> NetworkId {
        NetworkId::new(format!("{NETWORK_PREFIX}-{}", anchor.0))
    }
}

impl ClusterIndex for ProximityClusterer {
    fn rebuild(&mut self, registry: &mut NodeRegistry) {
        // Sorted by world id so membership order and names never depend on
        // arena layout.
        let mut nodes: Vec<_> = registry
            .iter()
            .map(|(id, node)| {
                let base = node.base();
                (base.world_object(), id, base.position(), base.connection_range())
            })
            .collect();
        nodes.sort_by_key(|&(world, ..)| world);

        let mut sets = DisjointSet::new(nodes.len());
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                let (_, _, pa, ra) = nodes[i];
                let (_, _, pb, rb) = nodes[j];
                if pa.within(&pb, ra.max(rb)) {
                    sets.union(i, j);
                }
            }
        }

        // The first member seen per root has the lowest world id.
        let mut names: BTreeMap<usize, NetworkId> = BTreeMap::new();
        self.members.clear();
        self.by_node.clear();
        for (i, &(world, id, ..)) in nodes.iter().enumerate() {
            let root = sets.find(i);
            let name = names
                .entry(root)
                .or_insert_with(|| Self::network_name(world))
                .clone();
            self.members.entry(name.clone()).or_default().push(id);
            self.by_node.insert(id, name);
        }

        for (&id, name) in &self.by_node {
            if let Some(node) = registry.get_mut(id) {
                node.base_mut().set_network_id(name.clone());
            }
        }
        registry.clear_topology();
        debug!(nodes = nodes.len(), networks = self.members.len(), "rebuilt clusters");
    }

    fn networks(&self) -> Vec<NetworkId> {
        self.members.keys().cloned().collect()
    }

    fn build_network_simulation_bundle(
        &self,
        registry: &NodeRegistry,
        network: &NetworkId,
        delta_time: Fixed64,
    ) -> Result<SimulationBundle, ClusterError> {
        let members = self
            .members
            .get(network)
            .ok_or_else(|| ClusterError::UnknownNetwork(network.clone()))?;
        let mut bundle = SimulationBundle::new(network.clone(), delta_time);
        for &id in members {
            let node = registry.get(id).ok_or_else(|| ClusterError::StaleMember {
                network: network.clone(),
                node: id,
            })?;
            bundle.push(id, node.kind());
        }
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eitrgrid_core::node::NodeBase;
    use eitrgrid_core::position::Position;
    use eitrgrid_core::test_utils::{fixed, pos, world};
    use eitrgrid_power::{ConsumerNode, PowerNode, PylonNode, StorageNode};

    fn storage_at(id: u64, at: Position, range: f32) -> PowerNode {
        StorageNode::new(NodeBase::new(world(id), at, range), fixed(10.0)).into()
    }

    fn pylon_at(id: u64, at: Position, range: f32) -> PowerNode {
        PylonNode::new(NodeBase::new(world(id), at, range)).into()
    }

    #[test]
    fn nearby_nodes_share_a_network() {
        let mut registry = NodeRegistry::new();
        let a = registry.insert(storage_at(10, pos(0.0, 0.0), 5.0));
        let b = registry.insert(storage_at(11, pos(4.0, 0.0), 5.0));
        let c = registry.insert(storage_at(12, pos(100.0, 0.0), 5.0));
        let mut index = ProximityClusterer::new();
        index.rebuild(&mut registry);

        assert_eq!(index.network_of(a), index.network_of(b));
        assert_ne!(index.network_of(a), index.network_of(c));
        assert_eq!(index.network_of(a), Some(&NetworkId::new("grid-10")));
        assert_eq!(index.network_count(), 2);
        assert_eq!(registry.get(b).map(|n| n.network_id().clone()), Some(NetworkId::new("grid-10")));
    }

    #[test]
    fn larger_range_wins() {
        let mut registry = NodeRegistry::new();
        let a = registry.insert(storage_at(1, pos(0.0, 0.0), 2.0));
        let b = registry.insert(pylon_at(2, pos(9.0, 0.0), 10.0));
        let mut index = ProximityClusterer::new();
        index.rebuild(&mut registry);
        assert_eq!(index.network_of(a), index.network_of(b));
    }

    #[test]
    fn pylon_chain_bridges_distant_nodes() {
        let mut registry = NodeRegistry::new();
        let left = registry.insert(storage_at(1, pos(0.0, 0.0), 6.0));
        registry.insert(pylon_at(2, pos(6.0, 0.0), 6.0));
        registry.insert(pylon_at(3, pos(12.0, 0.0), 6.0));
        let right = registry.insert(storage_at(4, pos(18.0, 0.0), 6.0));
        let mut index = ProximityClusterer::new();
        index.rebuild(&mut registry);
        assert_eq!(index.network_of(left), index.network_of(right));
        assert_eq!(index.network_count(), 1);
    }

    #[test]
    fn bundle_groups_members_by_kind() {
        let mut registry = NodeRegistry::new();
        let battery = registry.insert(storage_at(1, pos(0.0, 0.0), 5.0));
        let device = registry.insert(
            ConsumerNode::new(NodeBase::new(world(2), pos(1.0, 0.0), 5.0), fixed(1.0)).into(),
        );
        let mut index = ProximityClusterer::new();
        index.rebuild(&mut registry);

        let network = NetworkId::new("grid-1");
        let bundle = index
            .build_network_simulation_bundle(&registry, &network, fixed(0.5))
            .unwrap();
        assert_eq!(bundle.storages, vec![battery]);
        assert_eq!(bundle.consumers, vec![device]);
        assert_eq!(bundle.delta_time, fixed(0.5));
    }

    #[test]
    fn unknown_network_is_an_error() {
        let registry = NodeRegistry::new();
        let index = ProximityClusterer::new();
        let err = index
            .build_network_simulation_bundle(&registry, &NetworkId::new("nope"), fixed(1.0))
            .unwrap_err();
        assert_eq!(err, ClusterError::UnknownNetwork(NetworkId::new("nope")));
    }

    #[test]
    fn removed_member_needs_rebuild() {
        let mut registry = NodeRegistry::new();
        registry.insert(storage_at(1, pos(0.0, 0.0), 5.0));
        let gone = registry.insert(storage_at(2, pos(1.0, 0.0), 5.0));
        let mut index = ProximityClusterer::new();
        index.rebuild(&mut registry);
        registry.remove(world(2));

        let network = NetworkId::new("grid-1");
        let err = index.build_network_simulation_bundle(&registry, &network, fixed(1.0));
        assert!(matches!(err, Err(ClusterError::StaleMember { node, .. }) if node == gone));

        assert!(index.refresh(&mut registry));
        assert!(index.build_network_simulation_bundle(&registry, &network, fixed(1.0)).is_ok());
        assert!(!index.refresh(&mut registry));
    }
}
