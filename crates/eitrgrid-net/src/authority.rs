//! Request handling on the authoritative peer.
//!
//! Clients never mutate shared node state themselves; they ask. Every
//! request names a world object, and the authority claims that object's
//! record before applying anything, so a conflicting write from another
//! peer is overridden rather than merged. A request built on stale state
//! is refused and the sender is told to reload.

use crate::transport::PeerMessenger;
use crate::wire::{self, GridMessage, WireError};
use eitrgrid_core::fixed::{Fixed64, f32_to_fixed64};
use eitrgrid_core::id::{CharacterId, NodeId, PeerId, WorldObjectId};
use eitrgrid_core::node::PersistedNode;
use eitrgrid_core::record::{RecordError, RecordStore};
use eitrgrid_power::{InvalidIntensity, NodeKind, NodeRegistry, PowerIntensity, PowerNode};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("no registered node for world object {0:?}")]
    MissingNode(WorldObjectId),
    #[error(transparent)]
    MissingRecord(#[from] RecordError),
    #[error("world object {id:?} is not a {expected:?} node")]
    WrongKind { id: WorldObjectId, expected: NodeKind },
    #[error(transparent)]
    InvalidIntensity(#[from] InvalidIntensity),
    #[error("{0} is not a request")]
    NotARequest(&'static str),
    #[error("{field} = {value} is out of range")]
    OutOfRange { field: &'static str, value: f64 },
}

impl HandleError {
    /// Missing references are expected under churn; everything else means
    /// a malformed or misrouted message.
    pub fn is_missing_reference(&self) -> bool {
        matches!(self, HandleError::MissingNode(_) | HandleError::MissingRecord(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Applied,
    /// Fuel request accepted for this many items; an ack was sent.
    FuelAccepted(i32),
    /// Fuel request with nothing accepted; no ack is sent.
    FuelRefused,
    /// The sender's expected state was stale; it was told to reload.
    Corrected,
    /// A fuel request already filled; the ack was sent again.
    Duplicate,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Accepted fuel tokens remembered for duplicate detection.
pub const FUEL_TOKEN_MEMORY: usize = 256;

/// Largest power, eitr or capacity value a request may carry.
pub const MAX_WIRE_QUANTITY: f32 = 1.0e6;

/// Largest stack of fuel items a single request may carry.
pub const MAX_FUEL_ITEMS: i32 = 10_000;

/// Applies requests on the authority. Remembers recently accepted fuel
/// tokens so a redelivered request is acknowledged again but never filled
/// twice.
#[derive(Debug, Default)]
pub struct RequestHandler {
    accepted: BTreeMap<String, i32>,
    order: VecDeque<String>,
}

impl RequestHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode and apply one request from `from`.
    pub fn handle_payload<S: RecordStore, M: PeerMessenger>(
        &mut self,
        registry: &mut NodeRegistry,
        store: &mut S,
        messenger: &mut M,
        from: PeerId,
        payload: &[u8],
    ) -> Result<RequestOutcome, HandleError> {
        let message = wire::decode(payload)?;
        self.handle_request(registry, store, messenger, from, message)
    }

    pub fn handle_request<S: RecordStore, M: PeerMessenger>(
        &mut self,
        registry: &mut NodeRegistry,
        store: &mut S,
        messenger: &mut M,
        from: PeerId,
        message: GridMessage,
    ) -> Result<RequestOutcome, HandleError> {
        match message {
            GridMessage::ConsumerStateUpdate {
                id,
                is_demanding,
                base_power_consumption,
                intensity,
                expected_intensity,
            } => {
                let update = ConsumerUpdate {
                    is_demanding,
                    base_power_consumption: quantity("base_power_consumption", base_power_consumption)?,
                    intensity: PowerIntensity::try_from(intensity)?,
                    expected_intensity,
                };
                apply_consumer_update(registry, store, messenger, from, id, update)
            }
            GridMessage::FuelAddRequest { id, amount, token } => {
                if !(1..=MAX_FUEL_ITEMS).contains(&amount) {
                    return Err(HandleError::OutOfRange { field: "amount", value: f64::from(amount) });
                }
                if let Some(&accepted) = self.accepted.get(&token) {
                    debug!(node = ?id, peer = ?from, token = %token, "repeated fuel request, acking again");
                    send(messenger, from, &GridMessage::FuelCommitAck { token, accepted })?;
                    return Ok(RequestOutcome::Duplicate);
                }
                let outcome = apply_fuel_request(registry, store, messenger, from, id, amount, &token)?;
                if let RequestOutcome::FuelAccepted(accepted) = outcome {
                    self.remember(token, accepted);
                }
                Ok(outcome)
            }
            GridMessage::EitrOffer { id, entries } => {
                let roster = entries
                    .iter()
                    .map(|e| -> Result<_, HandleError> {
                        Ok((e.character, quantity("eitr", e.eitr)?, quantity("capacity", e.capacity)?))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                apply_eitr_offer(registry, store, messenger, id, &roster)
            }
            other @ (GridMessage::ChangedIds { .. } | GridMessage::FuelCommitAck { .. }) => {
                Err(HandleError::NotARequest(other.name()))
            }
        }
    }

    fn remember(&mut self, token: String, accepted: i32) {
        if self.order.len() == FUEL_TOKEN_MEMORY {
            if let Some(oldest) = self.order.pop_front() {
                self.accepted.remove(&oldest);
            }
        }
        self.order.push_back(token.clone());
        self.accepted.insert(token, accepted);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve(
    registry: &NodeRegistry,
    id: WorldObjectId,
    expected: NodeKind,
) -> Result<NodeId, HandleError> {
    let node = registry.lookup(id).ok_or(HandleError::MissingNode(id))?;
    match registry.get(node) {
        Some(n) if n.kind() == expected => Ok(node),
        Some(_) => Err(HandleError::WrongKind { id, expected }),
        None => Err(HandleError::MissingNode(id)),
    }
}

/// A non-negative, finite wire quantity no larger than [`MAX_WIRE_QUANTITY`].
fn quantity(field: &'static str, value: f32) -> Result<Fixed64, HandleError> {
    if value.is_finite() && (0.0..=MAX_WIRE_QUANTITY).contains(&value) {
        Ok(f32_to_fixed64(value))
    } else {
        Err(HandleError::OutOfRange { field, value: f64::from(value) })
    }
}

fn claim<S: RecordStore>(store: &mut S, id: WorldObjectId, local: PeerId) -> Result<(), HandleError> {
    store.require_mut(id)?.claim_ownership(local);
    Ok(())
}

fn send<M: PeerMessenger>(messenger: &mut M, to: PeerId, message: &GridMessage) -> Result<(), HandleError> {
    let payload = wire::encode(message)?;
    messenger.send(to, payload);
    Ok(())
}

// ---------------------------------------------------------------------------
// Consumer state
// ---------------------------------------------------------------------------

struct ConsumerUpdate {
    is_demanding: bool,
    base_power_consumption: Fixed64,
    intensity: PowerIntensity,
    expected_intensity: i32,
}

fn apply_consumer_update<S: RecordStore, M: PeerMessenger>(
    registry: &mut NodeRegistry,
    store: &mut S,
    messenger: &mut M,
    from: PeerId,
    id: WorldObjectId,
    update: ConsumerUpdate,
) -> Result<RequestOutcome, HandleError> {
    let node_id = resolve(registry, id, NodeKind::Consumer)?;
    let local = messenger.local_peer();
    let record = store.require_mut(id)?;
    record.claim_ownership(local);
    let Some(node) = registry.get_mut(node_id) else {
        return Err(HandleError::MissingNode(id));
    };
    let Some(consumer) = node.as_consumer_mut() else {
        return Err(HandleError::WrongKind { id, expected: NodeKind::Consumer });
    };

    let actual = consumer.intensity().code();
    if actual != update.expected_intensity {
        warn!(
            node = ?id,
            peer = ?from,
            expected = update.expected_intensity,
            actual,
            "intensity desync, pushing authoritative state"
        );
        // The sender reloads from the record, so it must be current.
        consumer.flush_dirty(record, local);
        consumer.base_mut().clear_dirty();
        let network_id = consumer.base().network_id().clone();
        send(messenger, from, &GridMessage::ChangedIds { network_id, ids: vec![id] })?;
        return Ok(RequestOutcome::Corrected);
    }

    consumer.set_demanding(update.is_demanding);
    consumer.set_base_power_consumption(update.base_power_consumption);
    consumer.set_power_mode(update.intensity);
    debug!(node = ?id, peer = ?from, intensity = ?update.intensity, "consumer state applied");
    Ok(RequestOutcome::Applied)
}

// ---------------------------------------------------------------------------
// Fuel
// ---------------------------------------------------------------------------

fn apply_fuel_request<S: RecordStore, M: PeerMessenger>(
    registry: &mut NodeRegistry,
    store: &mut S,
    messenger: &mut M,
    from: PeerId,
    id: WorldObjectId,
    amount: i32,
    token: &str,
) -> Result<RequestOutcome, HandleError> {
    let node_id = resolve(registry, id, NodeKind::Source)?;
    claim(store, id, messenger.local_peer())?;
    let Some(source) = registry.get_mut(node_id).and_then(PowerNode::as_source_mut) else {
        return Err(HandleError::WrongKind { id, expected: NodeKind::Source });
    };

    // Items are whole, so only whole units of headroom can be filled.
    let headroom = (source.fuel_capacity() - source.fuel() - source.pending_fuel()).max(Fixed64::ZERO);
    let accepted = amount.min(headroom.floor().saturating_to_num::<i32>());
    if accepted <= 0 {
        debug!(node = ?id, peer = ?from, amount, "fuel request refused");
        return Ok(RequestOutcome::FuelRefused);
    }
    source.add_fuel(Fixed64::from_num(accepted));
    let ack = GridMessage::FuelCommitAck { token: token.to_string(), accepted };
    send(messenger, from, &ack)?;
    debug!(node = ?id, peer = ?from, accepted, "fuel request accepted");
    Ok(RequestOutcome::FuelAccepted(accepted))
}

// ---------------------------------------------------------------------------
// Eitr offers
// ---------------------------------------------------------------------------

/// The offer is the full roster near the conduit: listed characters are
/// upserted, everyone else leaves the ledger.
fn apply_eitr_offer<S: RecordStore, M: PeerMessenger>(
    registry: &mut NodeRegistry,
    store: &mut S,
    messenger: &mut M,
    id: WorldObjectId,
    roster: &[(CharacterId, Fixed64, Fixed64)],
) -> Result<RequestOutcome, HandleError> {
    let node_id = resolve(registry, id, NodeKind::Conduit)?;
    claim(store, id, messenger.local_peer())?;
    let Some(conduit) = registry.get_mut(node_id).and_then(PowerNode::as_conduit_mut) else {
        return Err(HandleError::WrongKind { id, expected: NodeKind::Conduit });
    };

    let present: BTreeSet<_> = roster.iter().map(|&(character, ..)| character).collect();
    let departed = conduit.retain_players(|c| present.contains(&c));
    for &(character, eitr, capacity) in roster {
        conduit.add_or_update(character, eitr, capacity);
    }
    debug!(node = ?id, roster = roster.len(), departed, "eitr offer applied");
    Ok(RequestOutcome::Applied)
}
