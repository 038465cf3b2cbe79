//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use tandem_core::CoreConfig;
use tandem_shared::constants::{
    DEFAULT_EVENT_BUFFER, DEFAULT_HTTP_PORT, DEFAULT_MAX_MESSAGE_CHARS,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `None`, meaning the platform data directory.
    pub database_path: Option<PathBuf>,

    /// Per-topic event buffer.
    /// Env: `EVENT_BUFFER`
    /// Default: `256`
    pub event_buffer: usize,

    /// Longest accepted message in characters.
    /// Env: `MAX_MESSAGE_CHARS`
    /// Default: `2000`
    pub max_message_chars: usize,

    /// Sustained requests per second per caller.
    /// Env: `RATE_LIMIT_PER_SEC`
    /// Default: `10`
    pub rate_limit_per_sec: f64,

    /// Burst size per caller.
    /// Env: `RATE_LIMIT_BURST`
    /// Default: `30`
    pub rate_limit_burst: f64,

    /// Charge rate limits to the `x-user-id` header rather than the client
    /// address. Enable only behind an identity proxy that strips any
    /// client-supplied copy of the header.
    /// Env: `TRUST_USER_HEADER`
    /// Default: `false`
    pub trust_user_header: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            rate_limit_per_sec: 10.0,
            rate_limit_burst: 30.0,
            trust_user_header: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Invalid values are
    /// logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = parse_var(&lookup, "HTTP_ADDR") {
            config.http_addr = addr;
        }

        if let Some(path) = lookup("DATABASE_PATH").filter(|p| !p.trim().is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Some(n) = parse_var::<usize>(&lookup, "EVENT_BUFFER").filter(|n| *n > 0) {
            config.event_buffer = n;
        }

        if let Some(n) = parse_var::<usize>(&lookup, "MAX_MESSAGE_CHARS").filter(|n| *n > 0) {
            config.max_message_chars = n;
        }

        if let Some(rate) = parse_var::<f64>(&lookup, "RATE_LIMIT_PER_SEC").filter(|r| *r > 0.0) {
            config.rate_limit_per_sec = rate;
        }

        if let Some(burst) = parse_var::<f64>(&lookup, "RATE_LIMIT_BURST").filter(|b| *b >= 1.0) {
            config.rate_limit_burst = burst;
        }

        if let Some(trusted) = parse_var::<bool>(&lookup, "TRUST_USER_HEADER") {
            config.trust_user_header = trusted;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    /// Options handed to the matching core.
    pub fn core(&self) -> CoreConfig {
        CoreConfig {
            max_message_chars: self.max_message_chars,
            event_buffer: self.event_buffer,
            ..CoreConfig::default()
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = from_pairs(&[]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.database_path, None);
        assert_eq!(config.event_buffer, 256);
        assert_eq!(config.max_message_chars, 2000);
        assert!(!config.trust_user_header);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = from_pairs(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATABASE_PATH", "/tmp/tandem.db"),
            ("MAX_MESSAGE_CHARS", "500"),
            ("RATE_LIMIT_BURST", "5"),
            ("TRUST_USER_HEADER", "true"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/tandem.db")));
        assert_eq!(config.core().max_message_chars, 500);
        assert_eq!(config.rate_limit_burst, 5.0);
        assert!(config.trust_user_header);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("HTTP_ADDR", "not an address"),
            ("EVENT_BUFFER", "0"),
            ("RATE_LIMIT_PER_SEC", "fast"),
            ("TRUST_USER_HEADER", "yes"),
        ]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.event_buffer, 256);
        assert_eq!(config.rate_limit_per_sec, 10.0);
        assert!(!config.trust_user_header);
    }
}
