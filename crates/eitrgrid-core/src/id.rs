use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Identifies a power node in the local registry arena. Not stable
    /// across peers; use [`WorldObjectId`] on the wire.
    pub struct NodeId;
}

/// Stable identifier of the world object that owns a power node. The same
/// value names the node on every peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorldObjectId(pub u64);

/// Identifies a player character whose eitr pool a conduit can exchange with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub i64);

/// Identifies a connected peer (the authority or an observing client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub u64);

/// Sentinel network id for nodes that have not been clustered yet.
pub const UNASSIGNED_NETWORK: &str = "UNASSIGNED";

/// Identifies a network cluster of nodes that simulate together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub String);

impl NetworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The "not yet clustered" sentinel.
    pub fn unassigned() -> Self {
        Self(UNASSIGNED_NETWORK.to_string())
    }

    pub fn is_unassigned(&self) -> bool {
        self.0 == UNASSIGNED_NETWORK
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NetworkId {
    fn default() -> Self {
        Self::unassigned()
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
