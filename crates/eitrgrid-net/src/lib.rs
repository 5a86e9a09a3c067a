//! Eitrgrid Net -- peer-to-peer consistency for the power grid.
//!
//! One peer is the authority: it runs the simulation, owns the records it
//! writes, and replicates by telling nearby peers which records changed.
//! Everyone else observes and sends requests. The pieces:
//!
//! - [`wire`] -- versioned bitcode encoding of the five message shapes.
//! - [`transport`] -- the [`PeerMessenger`] seam and an in-memory hub.
//! - [`replication`] -- dirty-field flush plus range-filtered change
//!   notifications, on their own schedule.
//! - [`authority`] -- applying client requests, including desync
//!   correction.
//! - [`fuel`] -- the client half of the fuel handshake.
//! - [`peer`] -- [`GridPeer`], which ties the above to a registry,
//!   cluster index and simulator.

pub mod authority;
pub mod fuel;
pub mod peer;
pub mod replication;
pub mod transport;
pub mod wire;

pub use authority::{HandleError, RequestOutcome};
pub use fuel::{FuelReceipt, FuelRequestTracker, PendingFuel};
pub use peer::{GridPeer, InboxSummary, PeerRole, PeerTick};
pub use replication::{ReplicationScheduler, ReplicationSummary, Replicator, apply_changed_ids};
pub use transport::{Inbound, MemoryHub, MemoryMessenger, PeerInfo, PeerMessenger};
pub use wire::{EitrOfferEntry, GridMessage, WireError};
