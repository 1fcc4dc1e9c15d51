//! Server configuration — all from environment variables.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for WebSocket + HTTP.
    pub listen_addr: String,
    /// Directory served as static files (the canvas page). None = no static route.
    pub static_dir: Option<PathBuf>,
    /// Log level filter.
    pub log_level: String,
    /// Emit JSON log lines instead of the human-readable format.
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let listen_addr = env::var("LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.into());
        let port = env::var("PORT").ok().and_then(|v| v.parse::<u16>().ok());

        Self {
            listen_addr: with_port(&listen_addr, port),
            static_dir: env::var("STATIC_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            log_level: env::var("RUST_LOG")
                .unwrap_or_else(|_| "canvasd=info,tower_http=info".into()),
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.into(),
            static_dir: None,
            log_level: "canvasd=info,tower_http=info".into(),
            log_json: false,
        }
    }
}

/// Replace the port of `addr` when an explicit port is configured.
/// `addr` may be `host`, `host:port`, `ip:port`, `[v6]`, `[v6]:port` or a bare v6 address.
fn with_port(addr: &str, port: Option<u16>) -> String {
    let Some(port) = port else {
        return addr.to_string();
    };
    if let Ok(mut socket) = addr.parse::<SocketAddr>() {
        socket.set_port(port);
        return socket.to_string();
    }

    let host = match addr.rsplit_once(':') {
        Some((host, tail))
            if !host.is_empty()
                && !host.contains(':')
                && !tail.is_empty()
                && tail.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host
        }
        _ => addr,
    };
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_override_keeps_host() {
        assert_eq!(with_port("0.0.0.0:3000", Some(8081)), "0.0.0.0:8081");
        assert_eq!(with_port("[::1]:3000", Some(9000)), "[::1]:9000");
        assert_eq!(with_port("localhost", Some(80)), "localhost:80");
        assert_eq!(with_port("localhost:3000", Some(80)), "localhost:80");
    }

    #[test]
    fn port_override_handles_ipv6_without_port() {
        assert_eq!(with_port("[::1]", Some(80)), "[::1]:80");
        assert_eq!(with_port("::1", Some(80)), "[::1]:80");
        assert_eq!(with_port("fe80::2", Some(3000)), "[fe80::2]:3000");
    }

    #[test]
    fn no_port_leaves_addr_alone() {
        assert_eq!(with_port("127.0.0.1:3000", None), "127.0.0.1:3000");
    }
}
