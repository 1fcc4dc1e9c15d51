//! WebSocket transport — one task per connection.
//!
//! Flow per connection:
//! 1. Accept WS upgrade
//! 2. Assign identity, register the outbound queue (nothing sent yet)
//! 3. Message loop: hand every text frame to the relay
//! 4. On close/error: unregister

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::identity::{self, Identity};
use crate::registry::ConnectionSender;
use crate::relay::Relay;
use crate::state::AppState;

/// Axum handler for GET /ws — upgrades to WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Some(remote)))
}

/// Per-connection state machine.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, remote: Option<SocketAddr>) {
    let (mut sink, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Utf8Bytes>();

    // ── CONNECTING → OPEN ───────────────────────────────────
    let Some(conn_id) = admit(&state.relay, identity::assign(), tx, remote, &mut sink).await else {
        return;
    };

    let writer = tokio::spawn(writer_task(sink, rx));

    // ── Message loop ────────────────────────────────────────
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Err(e) = state.relay.handle(&conn_id, text.as_str()).await {
                    // A bad frame is dropped; the connection stays open.
                    warn!(conn_id = %conn_id, "message dropped: {e}");
                }
            }
            Ok(Message::Close(frame)) => {
                debug!(conn_id = %conn_id, reason = ?frame, "client closed");
                break;
            }
            Ok(Message::Binary(_)) => {
                debug!(conn_id = %conn_id, "binary frame ignored");
            }
            Ok(_) => { /* ping/pong handled by axum */ }
            Err(e) => {
                warn!(conn_id = %conn_id, "ws recv error: {e}");
                break;
            }
        }
    }

    // ── OPEN → CLOSED ───────────────────────────────────────
    state.relay.disconnect(&conn_id);
    writer.abort();
    info!(conn_id = %conn_id, "connection closed");
}

/// Register a new connection. On failure, log, send close code 1011 on
/// `sink` and leave the registry untouched.
async fn admit<S>(
    relay: &Relay,
    identity: Identity,
    tx: ConnectionSender,
    remote: Option<SocketAddr>,
    sink: &mut S,
) -> Option<Uuid>
where
    S: Sink<Message> + Unpin,
{
    match relay.connect_as(identity, tx, remote) {
        Ok(identity) => Some(identity.id),
        Err(e) => {
            warn!(remote = ?remote, "connection rejected: {e}");
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::ERROR,
                    reason: Utf8Bytes::from_static("identity unavailable"),
                })))
                .await;
            None
        }
    }
}

/// Drains the connection's outbound queue into the socket.
async fn writer_task(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Utf8Bytes>,
) {
    while let Some(frame) = rx.recv().await {
        if sink.send(Message::Text(frame)).await.is_err() {
            // Socket gone; the reader side will notice and unregister.
            break;
        }
    }
}
