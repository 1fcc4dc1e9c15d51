//! Connection registry — every live connection, keyed by its id.

use std::net::SocketAddr;

use axum::extract::ws::Utf8Bytes;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::CanvasError;
use crate::identity::Identity;

/// Sender half of a connection's outbound queue. The connection's writer
/// task drains the other half into the socket.
pub type ConnectionSender = mpsc::UnboundedSender<Utf8Bytes>;

/// One live client session.
#[derive(Debug)]
pub struct Connection {
    pub identity: Identity,
    pub remote: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
    sender: ConnectionSender,
}

impl Connection {
    pub fn new(identity: Identity, sender: ConnectionSender, remote: Option<SocketAddr>) -> Self {
        Self {
            identity,
            remote,
            connected_at: Utc::now(),
            sender,
        }
    }

    pub fn id(&self) -> Uuid {
        self.identity.id
    }

    /// Queue a frame. Never waits on the socket.
    pub fn send(&self, frame: Utf8Bytes) -> Result<(), CanvasError> {
        self.sender
            .send(frame)
            .map_err(|_| CanvasError::Send(self.identity.id))
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub failed: usize,
}

/// Set of open connections. Safe to mutate from any connection task while
/// another one is iterating; a concurrent add/remove may or may not be seen
/// by an in-flight `for_each`.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection: Connection) -> Result<(), CanvasError> {
        match self.connections.entry(connection.id()) {
            Entry::Occupied(_) => Err(CanvasError::DuplicateIdentity(connection.id())),
            Entry::Vacant(slot) => {
                slot.insert(connection);
                Ok(())
            }
        }
    }

    /// Remove `id`. Returns the connection if it was still registered;
    /// a second call for the same id is a no-op.
    pub fn unregister(&self, id: &Uuid) -> Option<Connection> {
        self.connections.remove(id).map(|(_, connection)| connection)
    }

    pub fn for_each(&self, mut visitor: impl FnMut(&Connection)) {
        for entry in self.connections.iter() {
            visitor(entry.value());
        }
    }

    /// Queue `frame` on one connection.
    pub fn send_to(&self, id: &Uuid, frame: Utf8Bytes) -> Result<(), CanvasError> {
        self.connections
            .get(id)
            .ok_or(CanvasError::Send(*id))?
            .send(frame)
    }

    /// Queue `frame` on every connection. A failed recipient is logged and
    /// skipped; the rest still get the frame.
    pub fn broadcast(&self, frame: &Utf8Bytes) -> FanOut {
        let mut outcome = FanOut::default();
        self.for_each(|connection| match connection.send(frame.clone()) {
            Ok(()) => outcome.delivered += 1,
            Err(e) => {
                tracing::warn!(conn_id = %connection.id(), "{e}");
                outcome.failed += 1;
            }
        });
        outcome
    }

    pub fn get_identity(&self, id: &Uuid) -> Option<Identity> {
        self.connections.get(id).map(|c| c.identity.clone())
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
