use crate::field::FieldKey;
use crate::id::NodeId;
use std::collections::BTreeSet;

/// Per-node set of persisted fields written since the last clear.
///
/// Nothing is sent when a field is marked; the replication pass reads the
/// set, flushes and notifies peers, then calls [`clear`](DirtyFields::clear).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtyFields {
    fields: BTreeSet<FieldKey>,
}

impl DirtyFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a single field as changed.
    pub fn mark(&mut self, key: FieldKey) {
        self.fields.insert(key);
    }

    pub fn is_dirty(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn contains(&self, key: FieldKey) -> bool {
        self.fields.contains(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.fields.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Forget every mark. Clearing an already clean set is a no-op.
    pub fn clear(&mut self) {
        self.fields.clear();
    }
}

/// Tracks which registry nodes have dirty fields, so the replication pass
/// can skip a full registry scan when nothing changed.
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    dirty_nodes: BTreeSet<NodeId>,
    topology_dirty: bool,
}

impl DirtyTracker {
    /// Create a new tracker with nothing dirty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a single node as having pending field changes.
    pub fn mark_node(&mut self, node: NodeId) {
        self.dirty_nodes.insert(node);
    }

    /// Mark the node set itself as changed (node loaded or unloaded), which
    /// invalidates any cached clustering.
    pub fn mark_topology(&mut self) {
        self.topology_dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty_nodes.is_empty() || self.topology_dirty
    }

    pub fn is_node_dirty(&self, node: NodeId) -> bool {
        self.dirty_nodes.contains(&node)
    }

    pub fn is_topology_dirty(&self) -> bool {
        self.topology_dirty
    }

    pub fn dirty_nodes(&self) -> &BTreeSet<NodeId> {
        &self.dirty_nodes
    }

    /// Drain the dirty node set, leaving the topology flag untouched.
    pub fn take_dirty_nodes(&mut self) -> BTreeSet<NodeId> {
        std::mem::take(&mut self.dirty_nodes)
    }

    pub fn clear_topology(&mut self) {
        self.topology_dirty = false;
    }

    /// Reset all dirty flags.
    pub fn mark_clean(&mut self) {
        self.dirty_nodes.clear();
        self.topology_dirty = false;
    }
}
