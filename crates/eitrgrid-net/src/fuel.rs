//! Client side of the fuel handshake.
//!
//! A player putting fuel into a source sends a request with a fresh token
//! and keeps the items. Only the authority's acknowledgment for that token
//! lets the client take the accepted items out of the inventory. A request
//! nobody acknowledges within the timeout is abandoned and the items stay
//! where they were.

use crate::wire::GridMessage;
use eitrgrid_core::fixed::{Fixed64, f64_to_fixed64};
use eitrgrid_core::id::{PeerId, WorldObjectId};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFuel {
    pub token: String,
    pub source: WorldObjectId,
    pub amount: i32,
    age: Fixed64,
}

impl PendingFuel {
    pub fn age(&self) -> Fixed64 {
        self.age
    }
}

/// An acknowledged request: remove `accepted` items from the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuelReceipt {
    pub source: WorldObjectId,
    pub requested: i32,
    pub accepted: i32,
}

#[derive(Debug, Clone)]
pub struct FuelRequestTracker {
    local: PeerId,
    timeout: Fixed64,
    next_serial: u64,
    pending: BTreeMap<String, PendingFuel>,
}

impl FuelRequestTracker {
    pub fn new(local: PeerId, timeout_seconds: f64) -> Self {
        Self {
            local,
            timeout: f64_to_fixed64(timeout_seconds),
            next_serial: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Open a request and build the message to send. Tokens are unique per
    /// client because they carry the peer id.
    pub fn request(&mut self, source: WorldObjectId, amount: i32) -> (String, GridMessage) {
        self.next_serial += 1;
        let token = format!("fuel-{}-{}", self.local.0, self.next_serial);
        self.pending.insert(
            token.clone(),
            PendingFuel {
                token: token.clone(),
                source,
                amount,
                age: Fixed64::ZERO,
            },
        );
        let message = GridMessage::FuelAddRequest {
            id: source,
            amount,
            token: token.clone(),
        };
        (token, message)
    }

    /// Close a request on acknowledgment. A token that is unknown or
    /// already resolved yields `None`, so a duplicated ack is harmless.
    pub fn resolve(&mut self, token: &str, accepted: i32) -> Option<FuelReceipt> {
        let Some(pending) = self.pending.remove(token) else {
            debug!(token, "ack for unknown or settled fuel request");
            return None;
        };
        Some(FuelReceipt {
            source: pending.source,
            requested: pending.amount,
            accepted: accepted.clamp(0, pending.amount),
        })
    }

    /// Age every request by `dt` and drop the ones past the timeout.
    pub fn advance(&mut self, dt: Fixed64) -> Vec<PendingFuel> {
        let timeout = self.timeout;
        let mut expired = Vec::new();
        self.pending.retain(|_, pending| {
            pending.age += dt.max(Fixed64::ZERO);
            if pending.age >= timeout {
                expired.push(pending.clone());
                false
            } else {
                true
            }
        });
        for request in &expired {
            debug!(token = %request.token, source = ?request.source, "fuel request abandoned");
        }
        expired
    }

    pub fn is_pending(&self, token: &str) -> bool {
        self.pending.contains_key(token)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
