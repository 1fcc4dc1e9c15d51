//! Error types for canvasd.

use std::io;

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    /// Inbound frame is not a valid message envelope. The frame is dropped,
    /// the connection stays open.
    #[error("malformed message: {0}")]
    Decode(#[source] serde_json::Error),

    /// Outbound message could not be serialized.
    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("connection id already registered: {0}")]
    DuplicateIdentity(Uuid),

    /// Outbound queue for this connection is gone (its writer has stopped).
    #[error("send to {0} failed: connection closed")]
    Send(Uuid),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] io::Error),
}
