use std::net::SocketAddr;
use std::time::Duration;

use sockjs::Options;

use crate::cli::Cli;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub prefix: String,
    pub log_filter: String,
    pub heartbeat_secs: u64,
    pub disconnect_secs: u64,
    pub response_limit: usize,
    pub websocket: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Options::default();
        let bind_addr = lookup("SOCKJS_ECHO_ADDR")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_addr);
        let prefix = normalize_prefix(&lookup("SOCKJS_ECHO_PREFIX").unwrap_or_else(|| "/echo".into()));
        let log_filter = lookup("RUST_LOG").unwrap_or_else(|| "info,sockjs=debug".into());
        let heartbeat_secs = lookup("SOCKJS_HEARTBEAT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.heartbeat_delay.as_secs());
        let disconnect_secs = lookup("SOCKJS_DISCONNECT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.disconnect_delay.as_secs());
        let response_limit = lookup("SOCKJS_RESPONSE_LIMIT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.response_limit);
        let websocket = lookup("SOCKJS_WEBSOCKET")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
            .unwrap_or(defaults.websocket);

        Self {
            bind_addr,
            prefix,
            log_filter,
            heartbeat_secs,
            disconnect_secs,
            response_limit,
            websocket,
        }
    }

    pub fn apply_cli(mut self, cli: &Cli) -> Self {
        if let Some(addr) = cli.addr {
            self.bind_addr = addr;
        }
        if let Some(prefix) = &cli.prefix {
            self.prefix = normalize_prefix(prefix);
        }
        if let Some(secs) = cli.heartbeat_secs {
            self.heartbeat_secs = secs;
        }
        if let Some(secs) = cli.disconnect_secs {
            self.disconnect_secs = secs;
        }
        if let Some(limit) = cli.response_limit {
            self.response_limit = limit;
        }
        if cli.no_websocket {
            self.websocket = false;
        }
        if let Some(filter) = &cli.log {
            self.log_filter = filter.clone();
        }
        self
    }

    pub fn options(&self) -> Options {
        Options {
            websocket: self.websocket,
            heartbeat_delay: Duration::from_secs(self.heartbeat_secs.max(1)),
            disconnect_delay: Duration::from_secs(self.disconnect_secs.max(1)),
            response_limit: self.response_limit.max(1),
            ..Options::default()
        }
    }
}

fn default_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8081))
}

// axum refuses to nest at "" or at a path with a trailing slash.
fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/echo".to_string()
    } else {
        format!("/{trimmed}")
    }
}
