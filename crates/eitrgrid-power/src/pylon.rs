//! Transmission-only node. A pylon neither produces nor consumes; it extends
//! a network's reach for clustering and counts as an affected node when
//! replication decides which peers are near a change.

use eitrgrid_core::field::{FieldKey, FieldValue};
use eitrgrid_core::node::{FieldError, NodeBase, PersistedNode};

#[derive(Debug, Clone)]
pub struct PylonNode {
    base: NodeBase,
}

impl PylonNode {
    pub fn new(base: NodeBase) -> Self {
        Self { base }
    }
}

impl PersistedNode for PylonNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn kind_fields(&self) -> &'static [FieldKey] {
        &[]
    }

    fn kind_field_value(&self, _key: FieldKey) -> Option<FieldValue> {
        None
    }

    fn apply_kind_field(&mut self, key: FieldKey, _value: &FieldValue) -> Result<(), FieldError> {
        Err(FieldError::NotPersisted { key })
    }
}
