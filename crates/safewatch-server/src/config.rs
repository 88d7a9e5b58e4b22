//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server starts with zero configuration
//! for local development.

use std::net::SocketAddr;
use std::str::FromStr;

use safewatch_shared::constants::{DEFAULT_CONNECTION_BUFFER, DEFAULT_HTTP_PORT};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP API and the WebSocket presence channel.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// Human-readable name for this instance, shown on `/info`.
    /// Env: `INSTANCE_NAME`
    pub instance_name: String,

    /// Sustained requests per second allowed per client IP.
    /// Env: `RATE_LIMIT_PER_SEC`
    pub rate_limit_per_sec: f64,

    /// Burst size per client IP.
    /// Env: `RATE_LIMIT_BURST`
    pub rate_limit_burst: f64,

    /// Outbound events queued per connection before new ones are dropped.
    /// Env: `CONNECTION_BUFFER`
    pub connection_buffer: usize,

    /// Bearer token for `/admin/*`. Admin API is disabled when unset.
    /// Env: `ADMIN_TOKEN`
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            instance_name: "SafeWatch Hub".to_string(),
            rate_limit_per_sec: 10.0,
            rate_limit_burst: 30.0,
            connection_buffer: DEFAULT_CONNECTION_BUFFER,
            admin_token: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        parse_into(&lookup, "HTTP_ADDR", &mut config.http_addr);

        if let Some(name) = lookup("INSTANCE_NAME") {
            config.instance_name = name;
        }

        parse_into(&lookup, "RATE_LIMIT_PER_SEC", &mut config.rate_limit_per_sec);
        parse_into(&lookup, "RATE_LIMIT_BURST", &mut config.rate_limit_burst);
        if config.rate_limit_burst < 1.0 {
            tracing::warn!(
                value = config.rate_limit_burst,
                "RATE_LIMIT_BURST below 1 would reject every request, using 1"
            );
            config.rate_limit_burst = 1.0;
        }

        parse_into(&lookup, "CONNECTION_BUFFER", &mut config.connection_buffer);
        if config.connection_buffer == 0 {
            // tokio mpsc channels require a non-zero capacity
            config.connection_buffer = DEFAULT_CONNECTION_BUFFER;
        }

        if let Some(token) = lookup("ADMIN_TOKEN") {
            if !token.is_empty() {
                config.admin_token = Some(token);
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }
}

/// Overwrite `field` with the parsed value of `key`, keeping the default on
/// parse failure.
fn parse_into<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, field: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *field = value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
        }
    }
}
