//! The closed set of node kinds, dispatched by pattern matching.

use crate::conduit::ConduitNode;
use crate::consumer::ConsumerNode;
use crate::pylon::PylonNode;
use crate::source::SourceNode;
use crate::storage::StorageNode;
use eitrgrid_core::field::{FieldKey, FieldValue};
use eitrgrid_core::id::{NetworkId, WorldObjectId};
use eitrgrid_core::node::{FieldError, NodeBase, PersistedNode};
use eitrgrid_core::position::Position;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Source,
    Storage,
    Consumer,
    Conduit,
    Pylon,
}

#[derive(Debug, Clone)]
pub enum PowerNode {
    Source(SourceNode),
    Storage(StorageNode),
    Consumer(ConsumerNode),
    Conduit(ConduitNode),
    Pylon(PylonNode),
}

macro_rules! dispatch {
    ($node:expr, $inner:ident => $body:expr) => {
        match $node {
            PowerNode::Source($inner) => $body,
            PowerNode::Storage($inner) => $body,
            PowerNode::Consumer($inner) => $body,
            PowerNode::Conduit($inner) => $body,
            PowerNode::Pylon($inner) => $body,
        }
    };
}

impl PowerNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            PowerNode::Source(_) => NodeKind::Source,
            PowerNode::Storage(_) => NodeKind::Storage,
            PowerNode::Consumer(_) => NodeKind::Consumer,
            PowerNode::Conduit(_) => NodeKind::Conduit,
            PowerNode::Pylon(_) => NodeKind::Pylon,
        }
    }

    pub fn world_object(&self) -> WorldObjectId {
        self.base().world_object()
    }

    pub fn network_id(&self) -> &NetworkId {
        self.base().network_id()
    }

    pub fn position(&self) -> Position {
        self.base().position()
    }

    pub fn is_active(&self) -> bool {
        self.base().is_active()
    }

    /// Route activation through the kind's own callback where it has one.
    pub fn set_active(&mut self, active: bool) -> bool {
        match self {
            PowerNode::Source(source) => source.set_active(active),
            PowerNode::Consumer(consumer) => consumer.set_powered(active),
            other => other.base_mut().set_active(active),
        }
    }

    pub fn as_source(&self) -> Option<&SourceNode> {
        match self {
            PowerNode::Source(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_source_mut(&mut self) -> Option<&mut SourceNode> {
        match self {
            PowerNode::Source(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_storage(&self) -> Option<&StorageNode> {
        match self {
            PowerNode::Storage(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_storage_mut(&mut self) -> Option<&mut StorageNode> {
        match self {
            PowerNode::Storage(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_consumer(&self) -> Option<&ConsumerNode> {
        match self {
            PowerNode::Consumer(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_consumer_mut(&mut self) -> Option<&mut ConsumerNode> {
        match self {
            PowerNode::Consumer(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_conduit(&self) -> Option<&ConduitNode> {
        match self {
            PowerNode::Conduit(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_conduit_mut(&mut self) -> Option<&mut ConduitNode> {
        match self {
            PowerNode::Conduit(node) => Some(node),
            _ => None,
        }
    }
}

impl PersistedNode for PowerNode {
    fn base(&self) -> &NodeBase {
        dispatch!(self, node => node.base())
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        dispatch!(self, node => node.base_mut())
    }

    fn kind_fields(&self) -> &'static [FieldKey] {
        dispatch!(self, node => node.kind_fields())
    }

    fn kind_field_value(&self, key: FieldKey) -> Option<FieldValue> {
        dispatch!(self, node => node.kind_field_value(key))
    }

    fn apply_kind_field(&mut self, key: FieldKey, value: &FieldValue) -> Result<(), FieldError> {
        dispatch!(self, node => node.apply_kind_field(key, value))
    }
}

impl From<SourceNode> for PowerNode {
    fn from(node: SourceNode) -> Self {
        PowerNode::Source(node)
    }
}

impl From<StorageNode> for PowerNode {
    fn from(node: StorageNode) -> Self {
        PowerNode::Storage(node)
    }
}

impl From<ConsumerNode> for PowerNode {
    fn from(node: ConsumerNode) -> Self {
        PowerNode::Consumer(node)
    }
}

impl From<ConduitNode> for PowerNode {
    fn from(node: ConduitNode) -> Self {
        PowerNode::Conduit(node)
    }
}

impl From<PylonNode> for PowerNode {
    fn from(node: PylonNode) -> Self {
        PowerNode::Pylon(node)
    }
}
