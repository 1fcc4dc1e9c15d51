//! canvasd — shared canvas relay server.

use tracing::{error, info};

use canvasd::config::Config;
use canvasd::state::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present (local dev).
    let _ = dotenvy::dotenv();

    let config = Config::from_env();
    canvasd::init_tracing(&config);

    info!("canvasd starting");
    info!(listen = %config.listen_addr, static_dir = ?config.static_dir);

    // ── Bind ────────────────────────────────────────────────
    let listener = match canvasd::bind(&config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    info!(addr = %config.listen_addr, "canvasd listening");

    // ── Serve ───────────────────────────────────────────────
    let state = AppState::new(config);
    if let Err(e) = canvasd::serve(listener, state, shutdown_signal()).await {
        error!("{e}");
        std::process::exit(1);
    }

    info!("canvasd stopped");
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
