//! Eitrgrid Core -- shared foundations for the power-grid simulation.
//!
//! This crate holds everything the node kinds, the clustering layer and the
//! replication protocol agree on: identifiers, deterministic fixed-point
//! math, the closed set of persisted fields, per-node dirty tracking, the
//! persisted world-object record with last-writer-wins ownership, and the
//! grid configuration.
//!
//! # Persistence Pattern
//!
//! Nodes never write records directly while simulating. Every persisted
//! write marks a [`field::FieldKey`] dirty on the node's
//! [`node::NodeBase`]; a later pass flushes the dirty fields to the record
//! (claiming ownership first) and tells nearby peers to reload:
//!
//! ```rust,ignore
//! node.base_mut().set_active(false);        // marks FieldKey::Active
//! node.flush_dirty(&mut record, local_peer); // claim + write
//! node.base_mut().clear_dirty();
//! ```
//!
//! # Key Types
//!
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for all energy math.
//! - [`node::NodeBase`] / [`node::PersistedNode`] -- shared node state and
//!   the load/save hooks.
//! - [`record::WorldRecord`] / [`record::RecordStore`] -- the persistence
//!   collaborator's field-keyed records.
//! - [`config::GridConfig`] -- tunable constants.

pub mod config;
pub mod dirty;
pub mod field;
pub mod fixed;
pub mod id;
pub mod node;
pub mod position;
pub mod record;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
