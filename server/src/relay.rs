//! Relay engine — the canvas state machine shared by every connection.
//!
//! Per connection: CONNECTING → OPEN on `connect` (identity assigned,
//! registered, nothing sent), OPEN → CLOSED on `disconnect`. While open:
//! - `init`  → reply to the requester only with `{id, color, state}`
//! - `paint` → append to the log, then queue on every connection,
//!   sender included
//! - anything else → logged, ignored
//!
//! Append + fan-out happen under the log's write lock and the `init` reply is
//! queued under its read lock, so every connection sees live paints in log
//! order and a paint queued before a connection's `init` reply is always in
//! that reply's `state`.

use std::net::SocketAddr;

use axum::extract::ws::Utf8Bytes;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::CanvasError;
use crate::identity::{self, Identity};
use crate::oplog::OperationLog;
use crate::registry::{Connection, ConnectionRegistry, ConnectionSender, FanOut};
use crate::types::{ClientMessage, InitPayload, Operation, ServerMessage};

/// What `handle` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Snapshot of `ops` operations sent to the requester.
    Init { ops: usize },
    /// Operation recorded at `index` and fanned out.
    Paint { index: usize, fan_out: FanOut },
    /// Unrecognized type; nothing changed.
    Ignored,
}

#[derive(Debug, Default)]
pub struct Relay {
    registry: ConnectionRegistry,
    log: OperationLog,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    /// Open a connection: assign its identity and register its outbound
    /// queue. Nothing is sent until the client asks for `init`.
    pub fn connect(
        &self,
        sender: ConnectionSender,
        remote: Option<SocketAddr>,
    ) -> Result<Identity, CanvasError> {
        self.connect_as(identity::assign(), sender, remote)
    }

    /// Open a connection under an already assigned identity.
    pub fn connect_as(
        &self,
        identity: Identity,
        sender: ConnectionSender,
        remote: Option<SocketAddr>,
    ) -> Result<Identity, CanvasError> {
        self.registry
            .register(Connection::new(identity.clone(), sender, remote))?;

        info!(
            conn_id = %identity.id,
            remote = ?remote,
            clients = self.registry.len(),
            "client connected"
        );
        Ok(identity)
    }

    /// Close a connection. Repeated calls are no-ops.
    pub fn disconnect(&self, id: &Uuid) {
        if let Some(connection) = self.registry.unregister(id) {
            let session = chrono::Utc::now() - connection.connected_at;
            info!(
                conn_id = %id,
                session_secs = session.num_seconds(),
                clients = self.registry.len(),
                "client disconnected"
            );
        }
    }

    /// Handle one inbound text frame from connection `id`.
    pub async fn handle(&self, id: &Uuid, text: &str) -> Result<Handled, CanvasError> {
        debug!(conn_id = %id, "message received: {text}");

        match ClientMessage::decode(text)? {
            ClientMessage::Init => self.serve_init(id).await,
            ClientMessage::Paint(op) => Ok(self.record_paint(op).await),
            ClientMessage::Unrecognized(kind) => {
                info!(conn_id = %id, kind = %kind, "ignoring unrecognized message type");
                Ok(Handled::Ignored)
            }
        }
    }

    async fn serve_init(&self, id: &Uuid) -> Result<Handled, CanvasError> {
        let identity = self.registry.get_identity(id).ok_or(CanvasError::Send(*id))?;

        let ops = self
            .log
            .with_snapshot(|state| {
                let reply = ServerMessage::Init(InitPayload {
                    id: identity.id,
                    color: &identity.color,
                    state,
                })
                .encode()?;
                self.registry.send_to(id, Utf8Bytes::from(reply))?;
                Ok::<_, CanvasError>(state.len())
            })
            .await?;

        info!(conn_id = %id, ops, "init sent");
        Ok(Handled::Init { ops })
    }

    async fn record_paint(&self, op: Operation) -> Handled {
        let frame = Utf8Bytes::from(op.as_str().to_owned());
        let mut fan_out = FanOut::default();
        let index = self
            .log
            .append_with(op, |_| fan_out = self.registry.broadcast(&frame))
            .await;

        debug!(
            op = index,
            delivered = fan_out.delivered,
            failed = fan_out.failed,
            "paint broadcast"
        );
        Handled::Paint { index, fan_out }
    }
}
