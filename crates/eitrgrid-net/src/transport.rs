//! The peer messaging seam.
//!
//! The grid only needs three things from the host's networking: who is
//! connected and where their player stands, a fire-and-forget binary send,
//! and a way to pull what arrived. [`MemoryHub`] implements it in-process
//! for single-machine sessions and tests.

use eitrgrid_core::id::PeerId;
use eitrgrid_core::position::Position;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use tracing::debug;

/// A connected peer and its last known reference position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub position: Position,
}

/// One delivered payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub from: PeerId,
    pub payload: Vec<u8>,
}

/// Binary, per-recipient, at-least-once messaging.
pub trait PeerMessenger {
    fn local_peer(&self) -> PeerId;

    /// Remote peers currently connected, excluding the local one.
    fn peers(&self) -> Vec<PeerInfo>;

    /// Queue `payload` for `to`. Never blocks; delivery failures are the
    /// transport's business.
    fn send(&mut self, to: PeerId, payload: Vec<u8>);

    /// Next delivered payload, if any.
    fn poll(&mut self) -> Option<Inbound>;
}

// ---------------------------------------------------------------------------
// In-memory hub
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct HubState {
    positions: BTreeMap<PeerId, Position>,
    inboxes: BTreeMap<PeerId, VecDeque<Inbound>>,
    duplicate_delivery: bool,
    sent: usize,
}

/// Shared in-process message switch. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    state: Rc<RefCell<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a peer at `position` and hand back its endpoint.
    pub fn connect(&self, id: PeerId, position: Position) -> MemoryMessenger {
        let mut state = self.state.borrow_mut();
        state.positions.insert(id, position);
        state.inboxes.entry(id).or_default();
        MemoryMessenger {
            hub: self.clone(),
            local: id,
        }
    }

    pub fn disconnect(&self, id: PeerId) {
        let mut state = self.state.borrow_mut();
        state.positions.remove(&id);
        state.inboxes.remove(&id);
    }

    /// Update where a peer's player stands.
    pub fn move_peer(&self, id: PeerId, position: Position) {
        if let Some(slot) = self.state.borrow_mut().positions.get_mut(&id) {
            *slot = position;
        }
    }

    /// Deliver every message twice, exercising at-least-once receivers.
    pub fn set_duplicate_delivery(&self, enabled: bool) {
        self.state.borrow_mut().duplicate_delivery = enabled;
    }

    /// Messages sent through the hub so far, duplicates not counted.
    pub fn sent_count(&self) -> usize {
        self.state.borrow().sent
    }

    pub fn pending_for(&self, id: PeerId) -> usize {
        self.state.borrow().inboxes.get(&id).map_or(0, VecDeque::len)
    }
}

/// One peer's endpoint on a [`MemoryHub`].
#[derive(Debug, Clone)]
pub struct MemoryMessenger {
    hub: MemoryHub,
    local: PeerId,
}

impl PeerMessenger for MemoryMessenger {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    fn peers(&self) -> Vec<PeerInfo> {
        self.hub
            .state
            .borrow()
            .positions
            .iter()
            .filter(|&(&id, _)| id != self.local)
            .map(|(&id, &position)| PeerInfo { id, position })
            .collect()
    }

    fn send(&mut self, to: PeerId, payload: Vec<u8>) {
        let mut state = self.hub.state.borrow_mut();
        state.sent += 1;
        let duplicate = state.duplicate_delivery;
        let Some(inbox) = state.inboxes.get_mut(&to) else {
            debug!(from = ?self.local, to = ?to, "dropping message for disconnected peer");
            return;
        };
        let message = Inbound {
            from: self.local,
            payload,
        };
        if duplicate {
            inbox.push_back(message.clone());
        }
        inbox.push_back(message);
    }

    fn poll(&mut self) -> Option<Inbound> {
        self.hub
            .state
            .borrow_mut()
            .inboxes
            .get_mut(&self.local)
            .and_then(VecDeque::pop_front)
    }
}
