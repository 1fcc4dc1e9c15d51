//! canvasd Rust client library.
//!
//! Join a shared canvas, replay its history, and paint on it:
//! ```ignore
//! let mut client = CanvasClient::connect("ws://localhost:3000/ws").await;
//! let mut canvas = Canvas::default();
//! client.paint(120.0, 80.0)?;
//! while let Some(event) = client.next_event().await {
//!     canvas.apply(&event);
//! }
//! ```
//!
//! The server echoes every paint back to its sender, so local strokes are
//! drawn from the broadcast just like everyone else's.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Dot radius used by `paint`.
pub const DEFAULT_RADIUS: f64 = 10.0;

/// Color used before the server has assigned one.
pub const UNASSIGNED_COLOR: &str = "black";

// ═══════════════════════════════════════════════════════════════
// Public types
// ═══════════════════════════════════════════════════════════════

/// One filled circular arc, as carried by `paint` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaintPayload {
    pub id: Option<String>,
    pub color: String,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
}

impl PaintPayload {
    /// Full-circle dot at `(x, y)` with the default radius.
    pub fn dot(identity: Option<&Identity>, x: f64, y: f64) -> Self {
        Self {
            id: identity.map(|i| i.id.to_string()),
            color: identity
                .map(|i| i.color.clone())
                .unwrap_or_else(|| UNASSIGNED_COLOR.into()),
            x,
            y,
            radius: DEFAULT_RADIUS,
            start_angle: 0.0,
            end_angle: TAU,
        }
    }
}

/// Identity the server assigned to this connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub color: String,
}

/// What the background task reports.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasEvent {
    /// (Re)joined: new identity and the whole canvas so far, in order.
    Joined {
        identity: Identity,
        state: Vec<PaintPayload>,
    },
    /// A live paint from any client, this one included.
    Paint(PaintPayload),
}

/// Local replay of the shared canvas.
#[derive(Debug, Clone, Default)]
pub struct Canvas {
    dots: Vec<PaintPayload>,
}

impl Canvas {
    pub fn apply(&mut self, event: &CanvasEvent) {
        match event {
            CanvasEvent::Joined { state, .. } => {
                self.dots.clear();
                self.dots.extend(state.iter().cloned());
            }
            CanvasEvent::Paint(dot) => self.dots.push(dot.clone()),
        }
    }

    /// Dots in drawing order.
    pub fn dots(&self) -> &[PaintPayload] {
        &self.dots
    }

    pub fn len(&self) -> usize {
        self.dots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dots.is_empty()
    }
}

#[derive(Debug)]
pub enum ClientError {
    /// WebSocket connection failed.
    ConnectionFailed(String),
    /// Channel closed (background task stopped).
    ChannelClosed,
    /// Serialization error.
    Serialize(String),
    /// Server sent something we could not understand.
    Protocol(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed(e) => write!(f, "connection failed: {e}"),
            Self::ChannelClosed => write!(f, "background task stopped"),
            Self::Serialize(e) => write!(f, "serialize error: {e}"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
        }
    }
}

impl std::error::Error for ClientError {}

// ═══════════════════════════════════════════════════════════════
// Client
// ═══════════════════════════════════════════════════════════════

/// Canvas client.
///
/// Internally spawns a background tokio task that owns the WebSocket and
/// reconnects with exponential backoff + jitter. Every (re)connect requests
/// `init`, so the client always resumes from a fresh snapshot under a new
/// identity. Methods queue through a channel and never block on I/O.
pub struct CanvasClient {
    tx: mpsc::Sender<Outbound>,
    events: mpsc::UnboundedReceiver<CanvasEvent>,
    identity: watch::Receiver<Option<Identity>>,
    connected: Arc<AtomicBool>,
}

/// Message sent from API methods to the background task.
enum Outbound {
    Paint(String),
    Close,
}

impl CanvasClient {
    /// Start the background connection to `server_ep`
    /// (`ws://`, `wss://`, `http://` or `https://`).
    pub async fn connect(server_ep: &str) -> Self {
        let url = normalize_ws_url(server_ep);
        let connected = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<Outbound>(256);
        let (events_tx, events) = mpsc::unbounded_channel();
        let (identity_tx, identity) = watch::channel(None);

        let bg_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            ws_task(url, rx, events_tx, identity_tx, bg_connected).await;
        });

        Self {
            tx,
            events,
            identity,
            connected,
        }
    }

    /// Whether the WebSocket is currently connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Identity of the current session; None until `init` is answered.
    pub fn identity(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    /// Next event from the server. None once the background task is gone.
    pub async fn next_event(&mut self) -> Option<CanvasEvent> {
        self.events.recv().await
    }

    /// Paint a default dot at `(x, y)` in this session's color.
    pub fn paint(&self, x: f64, y: f64) -> Result<(), ClientError> {
        let identity = self.identity();
        self.paint_dot(&PaintPayload::dot(identity.as_ref(), x, y))
    }

    /// Send an arbitrary paint payload.
    pub fn paint_dot(&self, payload: &PaintPayload) -> Result<(), ClientError> {
        let json = encode_paint(payload)?;
        match self.tx.try_send(Outbound::Paint(json)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("paint dropped (channel full)");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ClientError::ChannelClosed),
        }
    }

    /// Close the connection and stop the background task.
    pub async fn shutdown(self) -> Result<(), ClientError> {
        self.tx
            .send(Outbound::Close)
            .await
            .map_err(|_| ClientError::ChannelClosed)?;
        // Give the background task a moment to send the close frame.
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
// Wire protocol
// ═══════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct WireInit {
    r#type: &'static str,
}

#[derive(Serialize)]
struct WirePaint<'a> {
    r#type: &'static str,
    payload: &'a PaintPayload,
}

/// Inbound envelope.
#[derive(Deserialize)]
struct WireEnvelope {
    r#type: String,
    #[serde(default)]
    payload: JsonValue,
}

#[derive(Deserialize)]
struct WireInitPayload {
    id: Uuid,
    color: String,
    #[serde(default)]
    state: Vec<WireEnvelope>,
}

/// Decoded server frame.
#[derive(Debug, PartialEq)]
enum ServerFrame {
    Init {
        identity: Identity,
        state: Vec<PaintPayload>,
    },
    Paint(PaintPayload),
    Other(String),
}

fn encode_init() -> Result<String, ClientError> {
    serde_json::to_string(&WireInit { r#type: "init" }).map_err(|e| ClientError::Serialize(e.to_string()))
}

fn encode_paint(payload: &PaintPayload) -> Result<String, ClientError> {
    serde_json::to_string(&WirePaint {
        r#type: "paint",
        payload,
    })
    .map_err(|e| ClientError::Serialize(e.to_string()))
}

fn decode_server_frame(text: &str) -> Result<ServerFrame, ClientError> {
    let envelope: WireEnvelope =
        serde_json::from_str(text).map_err(|e| ClientError::Protocol(format!("invalid JSON: {e}")))?;

    match envelope.r#type.as_str() {
        "init" => {
            let init: WireInitPayload = serde_json::from_value(envelope.payload)
                .map_err(|e| ClientError::Protocol(format!("bad init payload: {e}")))?;
            // Unknown or malformed history entries are skipped, not fatal.
            let state = init
                .state
                .into_iter()
                .filter(|m| m.r#type == "paint")
                .filter_map(|m| match serde_json::from_value::<PaintPayload>(m.payload) {
                    Ok(dot) => Some(dot),
                    Err(e) => {
                        warn!("skipping malformed paint in history: {e}");
                        None
                    }
                })
                .collect();
            Ok(ServerFrame::Init {
                identity: Identity {
                    id: init.id,
                    color: init.color,
                },
                state,
            })
        }
        "paint" => serde_json::from_value(envelope.payload)
            .map(ServerFrame::Paint)
            .map_err(|e| ClientError::Protocol(format!("bad paint payload: {e}"))),
        other => Ok(ServerFrame::Other(other.to_string())),
    }
}

/// Convert server_ep URL to a ws:// URL suitable for tungstenite.
/// Handles: ws://, wss://, http://, https://
fn normalize_ws_url(ep: &str) -> String {
    let url = ep
        .replace("https://", "wss://")
        .replace("http://", "ws://");
    // Ensure /ws path if not present.
    if !url.contains("/ws") {
        format!("{}/ws", url.trim_end_matches('/'))
    } else {
        url
    }
}

// ═══════════════════════════════════════════════════════════════
// Background WebSocket task
// ═══════════════════════════════════════════════════════════════

/// Why a session ended.
enum SessionEnd {
    /// Connection lost; reconnect.
    Lost,
    /// Client asked to stop or was dropped.
    Stop,
}

/// Background task: owns the WebSocket, handles send/recv, reconnects.
async fn ws_task(
    url: String,
    mut rx: mpsc::Receiver<Outbound>,
    events: mpsc::UnboundedSender<CanvasEvent>,
    identity: watch::Sender<Option<Identity>>,
    connected: Arc<AtomicBool>,
) {
    let mut attempt: u32 = 0;

    loop {
        // ── Connect ─────────────────────────────────────────
        let ws_stream = match tokio_tungstenite::connect_async(&url).await {
            Ok((stream, _)) => {
                info!(url = %url, "WebSocket connected");
                attempt = 0;
                stream
            }
            Err(e) => {
                warn!(url = %url, attempt, "{}", ClientError::ConnectionFailed(e.to_string()));
                backoff_sleep(attempt).await;
                attempt = attempt.saturating_add(1);
                continue;
            }
        };
        connected.store(true, Ordering::Relaxed);

        let end = run_session(ws_stream, &mut rx, &events, &identity).await;

        connected.store(false, Ordering::Relaxed);
        identity.send_replace(None);
        if let SessionEnd::Stop = end {
            return;
        }

        // Connection lost — loop back to reconnect.
        backoff_sleep(attempt).await;
        attempt = attempt.saturating_add(1);
    }
}

async fn run_session<S>(
    ws_stream: tokio_tungstenite::WebSocketStream<S>,
    rx: &mut mpsc::Receiver<Outbound>,
    events: &mpsc::UnboundedSender<CanvasEvent>,
    identity: &watch::Sender<Option<Identity>>,
) -> SessionEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // ── Request identity + snapshot ─────────────────────────
    let init = match encode_init() {
        Ok(init) => init,
        Err(e) => {
            warn!("{e}");
            return SessionEnd::Stop;
        }
    };
    if let Err(e) = ws_tx.send(Message::Text(init.into())).await {
        warn!("failed to send init: {e}");
        return SessionEnd::Lost;
    }

    // Paints queued ahead of our init reply are already in its state.
    let mut joined = false;

    // ── Message loop ────────────────────────────────────────
    loop {
        tokio::select! {
            // Outbound messages from API methods.
            msg = rx.recv() => {
                match msg {
                    Some(Outbound::Paint(json)) => {
                        if let Err(e) = ws_tx.send(Message::Text(json.into())).await {
                            warn!("send error: {e}");
                            return SessionEnd::Lost;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        return SessionEnd::Stop;
                    }
                }
            }
            // Inbound messages from server.
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let event = match decode_server_frame(&text) {
                            Ok(ServerFrame::Init { identity: me, state }) => {
                                info!(id = %me.id, color = %me.color, ops = state.len(), "joined canvas");
                                joined = true;
                                identity.send_replace(Some(me.clone()));
                                CanvasEvent::Joined { identity: me, state }
                            }
                            Ok(ServerFrame::Paint(dot)) if joined => CanvasEvent::Paint(dot),
                            Ok(ServerFrame::Paint(_)) => {
                                debug!("paint before init reply skipped");
                                continue;
                            }
                            Ok(ServerFrame::Other(kind)) => {
                                debug!(kind = %kind, "ignoring server message");
                                continue;
                            }
                            Err(e) => {
                                warn!("{e}");
                                continue;
                            }
                        };
                        if events.send(event).is_err() {
                            debug!("event receiver dropped");
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("server closed connection");
                        return SessionEnd::Lost;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary
                    Some(Err(e)) => {
                        warn!("ws recv error: {e}");
                        return SessionEnd::Lost;
                    }
                    None => {
                        info!("ws stream ended");
                        return SessionEnd::Lost;
                    }
                }
            }
        }
    }
}

/// Exponential backoff with jitter.
/// delay = min(100ms × 2^attempt, 30s) + random(0, delay × 0.5)
async fn backoff_sleep(attempt: u32) {
    let total = backoff_delay(attempt, rand::random::<f64>());
    debug!(ms = total.as_millis(), attempt, "backoff sleep");
    tokio::time::sleep(total).await;
}

fn backoff_delay(attempt: u32, jitter: f64) -> Duration {
    let base_ms = 100u64.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
    let capped_ms = base_ms.min(30_000);
    let jitter_ms = (jitter * capped_ms as f64 * 0.5) as u64;
    Duration::from_millis(capped_ms + jitter_ms)
}

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dot(x: f64) -> PaintPayload {
        PaintPayload::dot(None, x, x)
    }

    #[test]
    fn test_paint_wire_format_is_camel_case() {
        let identity = Identity {
            id: Uuid::nil(),
            color: "#123456".into(),
        };
        let json = encode_paint(&PaintPayload::dot(Some(&identity), 5.0, 6.0)).unwrap();
        let value: JsonValue = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "paint",
                "payload": {
                    "id": Uuid::nil().to_string(),
                    "color": "#123456",
                    "x": 5.0, "y": 6.0, "radius": 10.0,
                    "startAngle": 0.0, "endAngle": TAU,
                }
            })
        );
    }

    #[test]
    fn test_unjoined_dot_is_anonymous_black() {
        let d = dot(1.0);
        assert_eq!(d.id, None);
        assert_eq!(d.color, "black");
    }

    #[test]
    fn test_decode_init_skips_unusable_history() {
        let text = json!({
            "type": "init",
            "payload": {
                "id": Uuid::nil().to_string(),
                "color": "#000000",
                "state": [
                    {"type": "paint", "payload": {"id": null, "color": "red", "x": 1, "y": 2, "radius": 10, "startAngle": 0, "endAngle": 1}},
                    {"type": "paint", "payload": {"x": "garbage"}},
                    {"type": "erase", "payload": {}},
                ]
            }
        })
        .to_string();

        match decode_server_frame(&text).unwrap() {
            ServerFrame::Init { identity, state } => {
                assert_eq!(identity.id, Uuid::nil());
                assert_eq!(state.len(), 1);
                assert_eq!(state[0].color, "red");
                assert_eq!(state[0].end_angle, 1.0);
            }
            other => panic!("expected init, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_paint_and_other() {
        let json = encode_paint(&dot(3.0)).unwrap();
        assert_eq!(decode_server_frame(&json).unwrap(), ServerFrame::Paint(dot(3.0)));
        assert_eq!(
            decode_server_frame(r#"{"type":"cursor"}"#).unwrap(),
            ServerFrame::Other("cursor".into())
        );
        assert!(matches!(
            decode_server_frame("nope"),
            Err(ClientError::Protocol(_))
        ));
    }

    #[test]
    fn test_canvas_replay() {
        let mut canvas = Canvas::default();
        canvas.apply(&CanvasEvent::Paint(dot(9.0)));
        canvas.apply(&CanvasEvent::Joined {
            identity: Identity {
                id: Uuid::new_v4(),
                color: "#abcdef".into(),
            },
            state: vec![dot(1.0), dot(2.0)],
        });
        canvas.apply(&CanvasEvent::Paint(dot(3.0)));

        let xs: Vec<f64> = canvas.dots().iter().map(|d| d.x).collect();
        assert_eq!(xs, vec![1.0, 2.0, 3.0]);
        assert_eq!(canvas.len(), 3);
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_delay(0, 0.0), Duration::from_millis(100));
        assert_eq!(backoff_delay(3, 0.0), Duration::from_millis(800));
        assert_eq!(backoff_delay(40, 0.0), Duration::from_secs(30));
        assert_eq!(backoff_delay(40, 1.0), Duration::from_secs(45));
    }

    #[test]
    fn test_normalize_ws_url() {
        assert_eq!(
            normalize_ws_url("ws://localhost:3000/ws"),
            "ws://localhost:3000/ws"
        );
        assert_eq!(
            normalize_ws_url("http://localhost:3000/"),
            "ws://localhost:3000/ws"
        );
        assert_eq!(
            normalize_ws_url("https://canvas.example:8443"),
            "wss://canvas.example:8443/ws"
        );
    }
}
