//! Binary encoding of grid messages.
//!
//! Every payload is a bitcode-encoded [`Envelope`]: a magic number and
//! format version ahead of the message, checked before the message is
//! trusted. Floats appear only here; the simulation converts them to
//! fixed point on receipt.

use eitrgrid_core::id::{CharacterId, NetworkId, WorldObjectId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a grid message.
pub const WIRE_MAGIC: u32 = 0xE17A_0001;

/// Current wire version. Increment when breaking the message layout.
pub const WIRE_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", WIRE_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported wire version: expected {}, got {}", WIRE_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("message from future version {0} (this build supports up to {WIRE_VERSION})")]
    FutureVersion(u32),
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One character's eitr pool as seen by the character tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EitrOfferEntry {
    pub character: CharacterId,
    pub eitr: f32,
    pub capacity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GridMessage {
    /// Authority to nearby peers: these records changed, reload them.
    ChangedIds {
        network_id: NetworkId,
        ids: Vec<WorldObjectId>,
    },
    /// Any peer to authority: a device's switch and power settings, with the
    /// intensity the sender believes is current.
    ConsumerStateUpdate {
        id: WorldObjectId,
        is_demanding: bool,
        base_power_consumption: f32,
        intensity: i32,
        expected_intensity: i32,
    },
    /// Client to authority: put `amount` fuel items into a source.
    FuelAddRequest {
        id: WorldObjectId,
        amount: i32,
        token: String,
    },
    /// Authority to client: the request with `token` was accepted for
    /// `accepted` items. Only then does the client take them from inventory.
    FuelCommitAck { token: String, accepted: i32 },
    /// Character tracker to authority: the roster near a conduit.
    EitrOffer {
        id: WorldObjectId,
        entries: Vec<EitrOfferEntry>,
    },
}

impl GridMessage {
    pub fn name(&self) -> &'static str {
        match self {
            GridMessage::ChangedIds { .. } => "changed_ids",
            GridMessage::ConsumerStateUpdate { .. } => "consumer_state_update",
            GridMessage::FuelAddRequest { .. } => "fuel_add_request",
            GridMessage::FuelCommitAck { .. } => "fuel_commit_ack",
            GridMessage::EitrOffer { .. } => "eitr_offer",
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    magic: u32,
    version: u32,
    message: GridMessage,
}

impl Envelope {
    fn validate(&self) -> Result<(), WireError> {
        if self.magic != WIRE_MAGIC {
            return Err(WireError::InvalidMagic(self.magic));
        }
        if self.version > WIRE_VERSION {
            return Err(WireError::FutureVersion(self.version));
        }
        if self.version < WIRE_VERSION {
            return Err(WireError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

pub fn encode(message: &GridMessage) -> Result<Vec<u8>, WireError> {
    let envelope = Envelope {
        magic: WIRE_MAGIC,
        version: WIRE_VERSION,
        message: message.clone(),
    };
    bitcode::serialize(&envelope).map_err(|e| WireError::Encode(e.to_string()))
}

pub fn decode(data: &[u8]) -> Result<GridMessage, WireError> {
    let envelope: Envelope =
        bitcode::deserialize(data).map_err(|e| WireError::Decode(e.to_string()))?;
    envelope.validate()?;
    Ok(envelope.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(magic: u32, version: u32, message: GridMessage) -> Vec<u8> {
        bitcode::serialize(&Envelope {
            magic,
            version,
            message,
        })
        .unwrap()
    }

    #[test]
    fn changed_ids_survive_encoding() {
        let message = GridMessage::ChangedIds {
            network_id: NetworkId::new("grid-4"),
            ids: vec![WorldObjectId(4), WorldObjectId(9)],
        };
        let bytes = encode(&message).unwrap();
        assert_eq!(decode(&bytes).unwrap(), message);
    }

    #[test]
    fn eitr_offer_keeps_entry_order() {
        let message = GridMessage::EitrOffer {
            id: WorldObjectId(1),
            entries: vec![
                EitrOfferEntry { character: CharacterId(7), eitr: 12.5, capacity: 50.0 },
                EitrOfferEntry { character: CharacterId(-3), eitr: 0.0, capacity: 20.0 },
            ],
        };
        let decoded = decode(&encode(&message).unwrap()).unwrap();
        let GridMessage::EitrOffer { entries, .. } = decoded else {
            panic!("wrong variant");
        };
        assert_eq!(entries[0].character, CharacterId(7));
        assert_eq!(entries[1].character, CharacterId(-3));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let bytes = raw(0xDEAD_BEEF, WIRE_VERSION, GridMessage::FuelCommitAck { token: "t".into(), accepted: 1 });
        assert_eq!(decode(&bytes), Err(WireError::InvalidMagic(0xDEAD_BEEF)));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let ack = GridMessage::FuelCommitAck { token: "t".into(), accepted: 1 };
        assert_eq!(
            decode(&raw(WIRE_MAGIC, WIRE_VERSION + 1, ack.clone())),
            Err(WireError::FutureVersion(WIRE_VERSION + 1))
        );
        assert_eq!(
            decode(&raw(WIRE_MAGIC, 0, ack)),
            Err(WireError::UnsupportedVersion(0))
        );
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(decode(&[1, 2, 3]), Err(WireError::Decode(_))));
        assert!(matches!(decode(&[]), Err(WireError::Decode(_))));
    }
}
