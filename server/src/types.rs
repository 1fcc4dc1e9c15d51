//! Wire protocol types.
//!
//! Every frame is a text envelope `{"type": ..., "payload": ...}`.
//! Client → server: `init`, `paint`. Server → client: `init`, `paint`.
//! A `paint` message is relayed and recorded exactly as received.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use uuid::Uuid;

use crate::error::CanvasError;

// ═══════════════════════════════════════════════════════════════
// Client → Server messages
// ═══════════════════════════════════════════════════════════════

/// Decoded inbound message. Only the `type` tag is interpreted.
#[derive(Debug)]
pub enum ClientMessage {
    /// Request for identity + canvas snapshot. Payload ignored.
    Init,
    /// A drawing operation, kept verbatim.
    Paint(Operation),
    /// Well-formed envelope with a tag we don't handle.
    Unrecognized(String),
}

/// Just enough of the envelope to dispatch on.
#[derive(Deserialize)]
struct EnvelopeHead {
    #[serde(rename = "type")]
    kind: String,
}

impl ClientMessage {
    pub fn decode(text: &str) -> Result<Self, CanvasError> {
        let head: EnvelopeHead = serde_json::from_str(text).map_err(CanvasError::Decode)?;
        Ok(match head.kind.as_str() {
            "init" => Self::Init,
            "paint" => Self::Paint(Operation::from_text(text)?),
            _ => Self::Unrecognized(head.kind),
        })
    }
}

/// One recorded drawing action: the complete inbound `paint` message.
///
/// The payload is never validated or rewritten; what a client sent is what
/// every other client replays.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Operation(Box<RawValue>);

impl Operation {
    pub fn from_text(text: &str) -> Result<Self, CanvasError> {
        RawValue::from_string(text.to_owned())
            .map(Self)
            .map_err(CanvasError::Decode)
    }

    pub fn as_str(&self) -> &str {
        self.0.get()
    }
}

// ═══════════════════════════════════════════════════════════════
// Server → Client messages
// ═══════════════════════════════════════════════════════════════

/// Top-level envelope to client. `paint` broadcasts are relayed raw and
/// never go through this type.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
    Init(InitPayload<'a>),
}

/// Reply to `init`: the requester's identity and every operation so far.
#[derive(Debug, Serialize)]
pub struct InitPayload<'a> {
    pub id: Uuid,
    pub color: &'a str,
    pub state: &'a [Operation],
}

impl ServerMessage<'_> {
    pub fn encode(&self) -> Result<String, CanvasError> {
        serde_json::to_string(self).map_err(CanvasError::Encode)
    }
}
