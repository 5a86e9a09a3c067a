use crate::node::NodeKind;
use eitrgrid_core::fixed::Fixed64;
use eitrgrid_core::id::{NetworkId, NodeId};

/// One network's nodes for a single tick, grouped by kind.
///
/// Built fresh by the clustering collaborator every tick and dropped after
/// the step. Order within each list is the order the step peeks and
/// commits in.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationBundle {
    pub network_id: NetworkId,
    pub delta_time: Fixed64,
    pub sources: Vec<NodeId>,
    pub storages: Vec<NodeId>,
    pub consumers: Vec<NodeId>,
    pub conduits: Vec<NodeId>,
    pub pylons: Vec<NodeId>,
}

impl SimulationBundle {
    pub fn new(network_id: NetworkId, delta_time: Fixed64) -> Self {
        Self {
            network_id,
            delta_time,
            sources: Vec::new(),
            storages: Vec::new(),
            consumers: Vec::new(),
            conduits: Vec::new(),
            pylons: Vec::new(),
        }
    }

    pub fn push(&mut self, id: NodeId, kind: NodeKind) {
        match kind {
            NodeKind::Source => self.sources.push(id),
            NodeKind::Storage => self.storages.push(id),
            NodeKind::Consumer => self.consumers.push(id),
            NodeKind::Conduit => self.conduits.push(id),
            NodeKind::Pylon => self.pylons.push(id),
        }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
            + self.storages.len()
            + self.consumers.len()
            + self.conduits.len()
            + self.pylons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every member, kind by kind.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.sources
            .iter()
            .chain(&self.storages)
            .chain(&self.consumers)
            .chain(&self.conduits)
            .chain(&self.pylons)
            .copied()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node_ids().any(|member| member == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eitrgrid_core::test_utils::{fixed, make_node_ids, net};

    #[test]
    fn push_sorts_by_kind() {
        let ids = make_node_ids(3);
        let mut bundle = SimulationBundle::new(net("a"), fixed(1.0));
        bundle.push(ids[0], NodeKind::Consumer);
        bundle.push(ids[1], NodeKind::Source);
        bundle.push(ids[2], NodeKind::Pylon);

        assert_eq!(bundle.sources, vec![ids[1]]);
        assert_eq!(bundle.consumers, vec![ids[0]]);
        assert_eq!(bundle.len(), 3);
        assert_eq!(bundle.node_ids().collect::<Vec<_>>(), vec![ids[1], ids[0], ids[2]]);
        assert!(bundle.contains(ids[2]));
    }
}
