//! canvasd — relay server for a shared real-time canvas.
//!
//! Clients connect over WebSocket, ask for `init` to receive their identity
//! and the canvas history, then send `paint` operations that are recorded in
//! one global order and echoed to every connected client.

pub mod config;
pub mod error;
pub mod identity;
pub mod oplog;
pub mod registry;
pub mod relay;
pub mod state;
pub mod types;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::CanvasError;
use crate::state::AppState;

/// All routes: `/ws`, `/healthz`, and the static canvas page if configured.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        // WebSocket endpoint.
        .route("/ws", get(ws::ws_handler))
        .route("/healthz", get(healthz));

    if let Some(dir) = &state.config.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Bind the configured address. Failing here is the only fatal error.
pub async fn bind(addr: &str) -> Result<TcpListener, CanvasError> {
    TcpListener::bind(addr).await.map_err(|source| CanvasError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Serve `state` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), CanvasError> {
    let app = router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

/// Liveness probe.
async fn healthz() -> &'static str {
    "ok"
}

/// Install the global tracing subscriber.
pub fn init_tracing(config: &config::Config) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .with_target(true);
    if config.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
    info!(json = config.log_json, "logging initialised");
}
