//! State and persistence plumbing shared by every power node.
//!
//! [`NodeBase`] owns the fields common to all node kinds (active flag,
//! network membership, connection range, position) and the node's
//! [`DirtyFields`]. Node kinds implement [`PersistedNode`] to expose their
//! own fields through the closed [`FieldKey`] set; the trait's provided
//! methods implement the `load`/`save` hooks and the dirty-only flush on
//! top of that.

use crate::dirty::DirtyFields;
use crate::field::{FieldKey, FieldValue};
use crate::id::{NetworkId, PeerId, WorldObjectId};
use crate::position::Position;
use crate::record::WorldRecord;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A persisted value that cannot be applied to a node.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("field {key:?} has the wrong value type")]
    TypeMismatch { key: FieldKey },
    #[error("field {key:?} holds an invalid value: {detail}")]
    Invalid { key: FieldKey, detail: String },
    #[error("field {key:?} is not persisted by this node kind")]
    NotPersisted { key: FieldKey },
}

// ---------------------------------------------------------------------------
// NodeBase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NodeBase {
    world_object: WorldObjectId,
    is_active: bool,
    network_id: NetworkId,
    /// Adjacency radius used by clustering; the simulation never reads it.
    connection_range: f32,
    position: Position,
    dirty: DirtyFields,
}

impl NodeBase {
    pub fn new(world_object: WorldObjectId, position: Position, connection_range: f32) -> Self {
        Self {
            world_object,
            is_active: true,
            network_id: NetworkId::unassigned(),
            connection_range,
            position,
            dirty: DirtyFields::new(),
        }
    }

    pub fn world_object(&self) -> WorldObjectId {
        self.world_object
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Set the active flag. Returns `true` on an actual transition, which is
    /// the caller's cue to run its own activation callback.
    pub fn set_active(&mut self, active: bool) -> bool {
        if self.is_active == active {
            return false;
        }
        self.is_active = active;
        self.dirty.mark(FieldKey::Active);
        true
    }

    pub fn network_id(&self) -> &NetworkId {
        &self.network_id
    }

    pub fn set_network_id(&mut self, id: NetworkId) {
        if self.network_id == id {
            return;
        }
        self.network_id = id;
        self.dirty.mark(FieldKey::NetworkId);
    }

    pub fn connection_range(&self) -> f32 {
        self.connection_range
    }

    /// Does not touch clustering; a registered node changes range through
    /// its registry so the network is recomputed.
    pub fn set_connection_range(&mut self, range: f32) {
        self.connection_range = range.max(0.0);
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Same caveat as [`set_connection_range`](Self::set_connection_range).
    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn mark_dirty(&mut self, key: FieldKey) {
        self.dirty.mark(key);
    }

    pub fn dirty_fields(&self) -> &DirtyFields {
        &self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    fn field_value(&self, key: FieldKey) -> Option<FieldValue> {
        match key {
            FieldKey::NetworkId => Some(FieldValue::from(&self.network_id)),
            FieldKey::Active => Some(FieldValue::Bool(self.is_active)),
            _ => None,
        }
    }

    /// Apply a base field without marking it dirty. Returns `Ok(false)` when
    /// the key is not a base field.
    fn apply_field(&mut self, key: FieldKey, value: &FieldValue) -> Result<bool, FieldError> {
        match key {
            FieldKey::NetworkId => {
                let text = value.as_text().ok_or(FieldError::TypeMismatch { key })?;
                self.network_id = NetworkId::new(text);
                Ok(true)
            }
            FieldKey::Active => {
                self.is_active = value.as_bool().ok_or(FieldError::TypeMismatch { key })?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// PersistedNode
// ---------------------------------------------------------------------------

/// A node whose fields live on a [`WorldRecord`].
pub trait PersistedNode {
    fn base(&self) -> &NodeBase;

    fn base_mut(&mut self) -> &mut NodeBase;

    /// Kind-specific persisted fields (the base fields are implied).
    fn kind_fields(&self) -> &'static [FieldKey];

    /// Current value of a kind-specific field.
    fn kind_field_value(&self, key: FieldKey) -> Option<FieldValue>;

    /// Overwrite a kind-specific field from a persisted value, without
    /// marking it dirty.
    fn apply_kind_field(&mut self, key: FieldKey, value: &FieldValue) -> Result<(), FieldError>;

    fn field_value(&self, key: FieldKey) -> Option<FieldValue> {
        self.base()
            .field_value(key)
            .or_else(|| self.kind_field_value(key))
    }

    fn apply_field(&mut self, key: FieldKey, value: &FieldValue) -> Result<(), FieldError> {
        if self.base_mut().apply_field(key, value)? {
            return Ok(());
        }
        if !self.kind_fields().contains(&key) {
            return Err(FieldError::NotPersisted { key });
        }
        self.apply_kind_field(key, value)
    }

    /// Save hook: write every persisted field, claiming the record first so
    /// no other peer commits a conflicting write.
    fn save(&self, record: &mut WorldRecord, writer: PeerId) {
        record.claim_ownership(writer);
        for &key in FieldKey::BASE.iter().chain(self.kind_fields()) {
            if let Some(value) = self.field_value(key) {
                record.set(key, value);
            }
        }
    }

    /// Write only the dirty fields. Returns `true` if anything was written.
    fn flush_dirty(&self, record: &mut WorldRecord, writer: PeerId) -> bool {
        if !self.base().is_dirty() {
            return false;
        }
        record.claim_ownership(writer);
        for key in self.base().dirty_fields().iter() {
            if let Some(value) = self.field_value(key) {
                record.set(key, value);
            }
        }
        true
    }

    /// Load hook: pull every field present on the record. The record is
    /// authoritative, so local marks are discarded. Invalid values are
    /// reported and skipped; the remaining fields still load.
    fn load(&mut self, record: &WorldRecord) -> Vec<FieldError> {
        let keys: Vec<FieldKey> = FieldKey::BASE
            .iter()
            .chain(self.kind_fields())
            .copied()
            .collect();
        let mut errors = Vec::new();
        for key in keys {
            if let Some(value) = record.get(key) {
                if let Err(err) = self.apply_field(key, value) {
                    tracing::error!(record = ?record.id(), %err, "rejected persisted field");
                    errors.push(err);
                }
            }
        }
        self.base_mut().clear_dirty();
        errors
    }
}
