//! Shared server state handed to every connection handler.

use std::sync::Arc;

use crate::config::Config;
use crate::relay::Relay;

/// Shared state accessible from all handlers.
pub struct AppState {
    /// Canvas history and live connections.
    pub relay: Relay,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            relay: Relay::new(),
            config,
        })
    }
}
