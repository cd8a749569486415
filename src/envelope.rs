//! Application-level JSON envelope layered above the frame codec.
//!
//! The `{"type": ..., "message": ...}` shape is an application convention,
//! not part of the WebSocket protocol; nothing in the handshake or codec
//! depends on it, and callers are free to frame any other payload encoding.

use serde::{Deserialize, Serialize};

/// A typed notification payload, serialized to JSON before framing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Application-defined event type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event body.
    pub message: String,
}

impl Envelope {
    #[must_use]
    pub fn new<K: Into<String>, M: Into<String>>(kind: K, message: M) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Serialize to the JSON text sent as a text-frame payload.
    ///
    /// # Errors
    /// Returns a `serde_json` error when serialization fails.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse an envelope back out of a received text payload.
    ///
    /// # Errors
    /// Returns a `serde_json` error when the payload is not a well-formed
    /// envelope.
    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}
