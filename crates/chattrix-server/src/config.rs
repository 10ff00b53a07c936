//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use chattrix_shared::constants::{DEFAULT_EVENT_BUFFER, DEFAULT_HTTP_PORT, MAX_ATTACHMENT_SIZE};

/// Who receives live status events (`newStatus`, `statusViewed`,
/// `statusDeleted`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAudience {
    /// Every connected user. Reads are still friendship-filtered.
    All,
    /// The status owner and the owner's friends.
    Friends,
}

impl FromStr for StatusAudience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "friends" => Ok(Self::Friends),
            other => Err(format!("expected 'all' or 'friends', got '{other}'")),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:5001`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./chattrix.db`
    pub database_path: PathBuf,

    /// Filesystem path where attachment blobs are stored.
    /// Env: `BLOB_STORAGE_PATH`
    /// Default: `./blobs`
    pub blob_storage_path: PathBuf,

    /// Base URL blob links are built from.
    /// Env: `PUBLIC_BASE_URL`
    /// Default: `http://localhost:5001`
    pub public_base_url: String,

    /// Maximum blob size in bytes (50 MiB).
    /// Env: `MAX_BLOB_SIZE`
    pub max_blob_size: usize,

    /// Outbound events queued per live connection before pushes are dropped.
    /// Env: `EVENT_BUFFER`
    /// Default: `256`
    pub event_buffer: usize,

    /// Audience of status events.
    /// Env: `STATUS_BROADCAST_SCOPE` (`all` / `friends`)
    /// Default: `friends` (the owner and their friends). Set `all` to push
    /// status events to every connected user instead.
    pub status_audience: StatusAudience,

    /// Seconds between sweeps that physically delete expired statuses.
    /// Env: `STATUS_SWEEP_INTERVAL_SECS`
    /// Default: `600`
    pub status_sweep_interval_secs: u64,

    /// Allowed CORS origin. Any origin when unset.
    /// Env: `CORS_ORIGIN`
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./chattrix.db"),
            blob_storage_path: PathBuf::from("./blobs"),
            public_base_url: format!("http://localhost:{DEFAULT_HTTP_PORT}"),
            max_blob_size: MAX_ATTACHMENT_SIZE,
            event_buffer: DEFAULT_EVENT_BUFFER,
            status_audience: StatusAudience::Friends,
            status_sweep_interval_secs: 600,
            cors_origin: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Invalid values are
    /// logged and replaced by the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            parse_into(&mut config.http_addr, "HTTP_ADDR", &addr);
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("BLOB_STORAGE_PATH") {
            config.blob_storage_path = PathBuf::from(path);
        }

        if let Some(url) = lookup("PUBLIC_BASE_URL") {
            config.public_base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(val) = lookup("MAX_BLOB_SIZE") {
            parse_into(&mut config.max_blob_size, "MAX_BLOB_SIZE", &val);
        }

        if let Some(val) = lookup("EVENT_BUFFER") {
            parse_into(&mut config.event_buffer, "EVENT_BUFFER", &val);
            config.event_buffer = config.event_buffer.max(1);
        }

        if let Some(val) = lookup("STATUS_BROADCAST_SCOPE") {
            parse_into(&mut config.status_audience, "STATUS_BROADCAST_SCOPE", &val);
        }

        if let Some(val) = lookup("STATUS_SWEEP_INTERVAL_SECS") {
            parse_into(
                &mut config.status_sweep_interval_secs,
                "STATUS_SWEEP_INTERVAL_SECS",
                &val,
            );
        }

        if let Some(origin) = lookup("CORS_ORIGIN") {
            if !origin.is_empty() {
                config.cors_origin = Some(origin);
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_into<T>(slot: &mut T, key: &str, value: &str)
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(e) => {
            tracing::warn!(key, value, error = %e, "Invalid configuration value, using default");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 5001).into());
        assert_eq!(config.status_audience, StatusAudience::Friends);
        assert_eq!(config.event_buffer, DEFAULT_EVENT_BUFFER);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = config_from(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("PUBLIC_BASE_URL", "https://chat.example.com/"),
            ("STATUS_BROADCAST_SCOPE", "All"),
            ("EVENT_BUFFER", "0"),
            ("CORS_ORIGIN", "https://app.example.com"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.public_base_url, "https://chat.example.com");
        assert_eq!(config.status_audience, StatusAudience::All);
        assert_eq!(config.event_buffer, 1);
        assert_eq!(config.cors_origin.as_deref(), Some("https://app.example.com"));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("MAX_BLOB_SIZE", "lots"),
            ("STATUS_BROADCAST_SCOPE", "everyone"),
        ]);
        let defaults = ServerConfig::default();
        assert_eq!(config.http_addr, defaults.http_addr);
        assert_eq!(config.max_blob_size, defaults.max_blob_size);
        assert_eq!(config.status_audience, StatusAudience::Friends);
    }
}
