//! Arena of live power nodes, owned by the simulation subsystem.
//!
//! Nodes enter when their world object loads and leave when it unloads.
//! The registry is passed by reference to the clustering collaborator and
//! the replication pass; there is no ambient global lookup.

use crate::node::PowerNode;
use eitrgrid_core::dirty::DirtyTracker;
use eitrgrid_core::id::{NodeId, WorldObjectId};
use eitrgrid_core::node::PersistedNode;
use eitrgrid_core::position::Position;
use slotmap::SlotMap;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: SlotMap<NodeId, PowerNode>,
    by_world: HashMap<WorldObjectId, NodeId>,
    dirty: DirtyTracker,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-on-load. A node already registered for the same world object
    /// is replaced, keeping its arena key.
    pub fn insert(&mut self, node: PowerNode) -> NodeId {
        let world = node.world_object();
        let id = match self.by_world.get(&world).copied() {
            Some(id) if self.nodes.contains_key(id) => {
                debug!(node = ?world, "replacing registered node");
                self.nodes[id] = node;
                id
            }
            _ => {
                let id = self.nodes.insert(node);
                self.by_world.insert(world, id);
                id
            }
        };
        self.dirty.mark_node(id);
        self.dirty.mark_topology();
        id
    }

    /// Remove-on-unload.
    pub fn remove(&mut self, world: WorldObjectId) -> Option<PowerNode> {
        let id = self.by_world.remove(&world)?;
        self.dirty.mark_topology();
        self.nodes.remove(id)
    }

    pub fn remove_node(&mut self, id: NodeId) -> Option<PowerNode> {
        let node = self.nodes.remove(id)?;
        self.by_world.remove(&node.world_object());
        self.dirty.mark_topology();
        Some(node)
    }

    /// Relocate a registered node. Clustering rebuilds on the next refresh
    /// when the position actually changed.
    pub fn move_node(&mut self, world: WorldObjectId, position: Position) -> bool {
        let Some(node) = self.lookup(world).and_then(|id| self.nodes.get_mut(id)) else {
            return false;
        };
        if node.position() == position {
            return false;
        }
        node.base_mut().set_position(position);
        self.dirty.mark_topology();
        true
    }

    /// Change how far a registered node reaches. Same rebuild rule as
    /// [`move_node`](Self::move_node).
    pub fn set_connection_range(&mut self, world: WorldObjectId, range: f32) -> bool {
        let Some(node) = self.lookup(world).and_then(|id| self.nodes.get_mut(id)) else {
            return false;
        };
        let range = range.max(0.0);
        if node.base().connection_range() == range {
            return false;
        }
        node.base_mut().set_connection_range(range);
        self.dirty.mark_topology();
        true
    }

    pub fn lookup(&self, world: WorldObjectId) -> Option<NodeId> {
        self.by_world.get(&world).copied()
    }

    pub fn get(&self, id: NodeId) -> Option<&PowerNode> {
        self.nodes.get(id)
    }

    /// Mutable access. The node becomes a candidate for the next
    /// replication pass; only candidates with dirty fields are flushed.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut PowerNode> {
        let node = self.nodes.get_mut(id)?;
        self.dirty.mark_node(id);
        Some(node)
    }

    pub fn by_world(&self, world: WorldObjectId) -> Option<&PowerNode> {
        self.lookup(world).and_then(|id| self.nodes.get(id))
    }

    pub fn by_world_mut(&mut self, world: WorldObjectId) -> Option<&mut PowerNode> {
        let id = self.lookup(world)?;
        self.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &PowerNode)> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drain the replication candidates, keeping those that still exist and
    /// carry dirty fields. Returned in arena key order.
    pub fn take_dirty_nodes(&mut self) -> Vec<NodeId> {
        self.dirty
            .take_dirty_nodes()
            .into_iter()
            .filter(|id| self.nodes.get(*id).is_some_and(|n| n.base().is_dirty()))
            .collect()
    }

    /// Mark a node for replication without touching it.
    pub fn mark_dirty(&mut self, id: NodeId) {
        if self.nodes.contains_key(id) {
            self.dirty.mark_node(id);
        }
    }

    /// Membership changed since the clustering collaborator last rebuilt.
    pub fn is_topology_dirty(&self) -> bool {
        self.dirty.is_topology_dirty()
    }

    pub fn mark_topology_dirty(&mut self) {
        self.dirty.mark_topology();
    }

    pub fn clear_topology(&mut self) {
        self.dirty.clear_topology();
    }
}
