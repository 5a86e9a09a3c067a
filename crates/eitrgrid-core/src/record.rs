//! Persisted world-object records and last-writer-wins ownership.
//!
//! A [`WorldRecord`] is the opaque per-world-object store owned by the
//! persistence layer: a field-keyed map plus the id of the peer currently
//! allowed to write it. Any peer may claim ownership at any time; the claim
//! is a transfer, not a lock, so the most recent claimant wins.

use crate::field::{FieldKey, FieldValue};
use crate::fixed::Fixed64;
use crate::id::{PeerId, WorldObjectId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("no record for world object {0:?}")]
    Missing(WorldObjectId),
}

// ---------------------------------------------------------------------------
// WorldRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldRecord {
    id: WorldObjectId,
    owner: Option<PeerId>,
    /// Bumped on every value change; lets a reader tell stale copies apart.
    revision: u64,
    fields: BTreeMap<FieldKey, FieldValue>,
}

impl WorldRecord {
    pub fn new(id: WorldObjectId) -> Self {
        Self {
            id,
            owner: None,
            revision: 0,
            fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> WorldObjectId {
        self.id
    }

    pub fn owner(&self) -> Option<PeerId> {
        self.owner
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_owner(&self, peer: PeerId) -> bool {
        self.owner == Some(peer)
    }

    /// Make `peer` the authoritative writer. Returns `true` if ownership
    /// actually moved.
    pub fn claim_ownership(&mut self, peer: PeerId) -> bool {
        if self.owner == Some(peer) {
            return false;
        }
        tracing::debug!(record = ?self.id, from = ?self.owner, to = ?peer, "ownership claimed");
        self.owner = Some(peer);
        true
    }

    pub fn get(&self, key: FieldKey) -> Option<&FieldValue> {
        self.fields.get(&key)
    }

    /// Store a value. The revision only moves when the value differs.
    pub fn set(&mut self, key: FieldKey, value: impl Into<FieldValue>) {
        let value = value.into();
        if self.fields.get(&key) == Some(&value) {
            return;
        }
        self.fields.insert(key, value);
        self.revision += 1;
    }

    pub fn get_bool(&self, key: FieldKey, default: bool) -> bool {
        self.get(key).and_then(FieldValue::as_bool).unwrap_or(default)
    }

    pub fn get_int(&self, key: FieldKey, default: i32) -> i32 {
        self.get(key).and_then(FieldValue::as_int).unwrap_or(default)
    }

    pub fn get_fixed(&self, key: FieldKey, default: Fixed64) -> Fixed64 {
        self.get(key).and_then(FieldValue::as_fixed).unwrap_or(default)
    }

    pub fn get_text(&self, key: FieldKey) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_text)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

/// Field-keyed persistence backend, one record per world object.
pub trait RecordStore {
    fn record(&self, id: WorldObjectId) -> Option<&WorldRecord>;

    fn record_mut(&mut self, id: WorldObjectId) -> Option<&mut WorldRecord>;

    fn insert(&mut self, record: WorldRecord);

    fn remove(&mut self, id: WorldObjectId) -> Option<WorldRecord>;

    /// Like [`record`](RecordStore::record) but reports a missing record as
    /// an error.
    fn require(&self, id: WorldObjectId) -> Result<&WorldRecord, RecordError> {
        self.record(id).ok_or(RecordError::Missing(id))
    }

    fn require_mut(&mut self, id: WorldObjectId) -> Result<&mut WorldRecord, RecordError> {
        self.record_mut(id).ok_or(RecordError::Missing(id))
    }
}

/// In-memory [`RecordStore`], used by single-process sessions and tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryRecordStore {
    records: BTreeMap<WorldObjectId, WorldRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = WorldObjectId> + '_ {
        self.records.keys().copied()
    }

    /// Copy one record from another store, standing in for the persistence
    /// layer's own record sync between peers.
    pub fn sync_from(&mut self, other: &MemoryRecordStore, id: WorldObjectId) {
        match other.records.get(&id) {
            Some(record) => {
                self.records.insert(id, record.clone());
            }
            None => {
                self.records.remove(&id);
            }
        }
    }
}

impl RecordStore for MemoryRecordStore {
    fn record(&self, id: WorldObjectId) -> Option<&WorldRecord> {
        self.records.get(&id)
    }

    fn record_mut(&mut self, id: WorldObjectId) -> Option<&mut WorldRecord> {
        self.records.get_mut(&id)
    }

    fn insert(&mut self, record: WorldRecord) {
        self.records.insert(record.id(), record);
    }

    fn remove(&mut self, id: WorldObjectId) -> Option<WorldRecord> {
        self.records.remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_is_last_writer_wins() {
        let mut record = WorldRecord::new(WorldObjectId(1));
        assert_eq!(record.owner(), None);

        assert!(record.claim_ownership(PeerId(1)));
        assert!(!record.claim_ownership(PeerId(1)));
        assert!(record.is_owner(PeerId(1)));

        assert!(record.claim_ownership(PeerId(2)));
        assert!(record.is_owner(PeerId(2)));
        assert!(!record.is_owner(PeerId(1)));
    }

    #[test]
    fn revision_moves_only_on_change() {
        let mut record = WorldRecord::new(WorldObjectId(1));
        record.set(FieldKey::Active, true);
        assert_eq!(record.revision(), 1);
        record.set(FieldKey::Active, true);
        assert_eq!(record.revision(), 1);
        record.set(FieldKey::Active, false);
        assert_eq!(record.revision(), 2);
    }

    #[test]
    fn typed_getters_fall_back_to_default() {
        let mut record = WorldRecord::new(WorldObjectId(1));
        record.set(FieldKey::Intensity, 2);
        assert_eq!(record.get_int(FieldKey::Intensity, 0), 2);
        // Wrong type and missing key both use the default.
        assert!(!record.get_bool(FieldKey::Intensity, false));
        assert_eq!(record.get_fixed(FieldKey::Fuel, Fixed64::ONE), Fixed64::ONE);
        assert_eq!(record.get_text(FieldKey::NetworkId), None);
    }

    #[test]
    fn store_require_reports_missing() {
        let mut store = MemoryRecordStore::new();
        store.insert(WorldRecord::new(WorldObjectId(5)));
        assert!(store.require(WorldObjectId(5)).is_ok());
        assert!(matches!(
            store.require(WorldObjectId(6)),
            Err(RecordError::Missing(WorldObjectId(6)))
        ));
    }

    #[test]
    fn sync_copies_and_removes() {
        let mut a = MemoryRecordStore::new();
        let mut b = MemoryRecordStore::new();
        let mut record = WorldRecord::new(WorldObjectId(1));
        record.set(FieldKey::Fuel, Fixed64::from_num(3));
        a.insert(record);

        b.sync_from(&a, WorldObjectId(1));
        assert_eq!(b.record(WorldObjectId(1)), a.record(WorldObjectId(1)));

        a.remove(WorldObjectId(1));
        b.sync_from(&a, WorldObjectId(1));
        assert!(b.is_empty());
    }
}
