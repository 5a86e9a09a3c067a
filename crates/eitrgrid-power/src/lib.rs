//! Power node compute model for the eitr grid.
//!
//! Four working node kinds share one tick:
//!
//! - [`SourceNode`] burns fuel into energy, bounded by output and burn rate.
//! - [`StorageNode`] holds energy and discharges in two phases (peek, commit).
//! - [`ConsumerNode`] requests energy at one of four discrete intensities.
//! - [`ConduitNode`] exchanges grid energy with characters' eitr pools.
//!
//! [`PylonNode`] only extends a network's reach. Nodes live in a
//! [`NodeRegistry`]; an external clustering collaborator groups them into a
//! [`SimulationBundle`] per network per tick, and [`GridSimulator::step`]
//! runs the peek, allocate and commit phases over it.
//!
//! # Design
//!
//! - Node kinds form a closed enum ([`PowerNode`]) dispatched by matching.
//! - Every persisted write marks a dirty field; nothing is sent directly.
//! - Conduits return [`EitrCommand`]s instead of touching characters.
//! - Events fire only on *transitions*, not every tick.

pub mod bundle;
pub mod conduit;
pub mod consumer;
pub mod node;
pub mod pylon;
pub mod registry;
pub mod sim;
pub mod source;
pub mod storage;

pub use bundle::SimulationBundle;
pub use conduit::{
    ConduitEconomy, ConduitMode, ConduitNode, ConduitOutcome, EitrCommand, EitrEntry,
    InvalidConduitMode,
};
pub use consumer::{ConsumerNode, InvalidIntensity, PowerIntensity};
pub use node::{NodeKind, PowerNode};
pub use pylon::PylonNode;
pub use registry::NodeRegistry;
pub use sim::{GridEvent, GridSimulator, NetworkState, StepReport};
pub use source::{SourceNode, SourceSpec};
pub use storage::StorageNode;
