//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `DATABASE_URL` — PostgreSQL storage when set, in-memory otherwise
/// - `NATS_URL` — NATS broker when set, in-process broker otherwise
/// - `BROKER_EXCHANGE` — exchange events are published to (default: `"events"`)
/// - `SSE_HEARTBEAT_SECS` — idle interval before a heartbeat frame (default: `15`)
/// - `STREAM_QUEUE_CAPACITY` — buffered payloads per client stream (default: `64`)
/// - `DAEMON_SOCKET` — Unix socket path for local command clients (disabled when unset)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub exchange: String,
    pub sse_heartbeat: Duration,
    pub stream_queue_capacity: usize,
    pub daemon_socket: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup. Unparsable numbers and
    /// blank values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: get("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: get("LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or(defaults.log_format),
            database_url: get("DATABASE_URL"),
            nats_url: get("NATS_URL"),
            exchange: get("BROKER_EXCHANGE").unwrap_or(defaults.exchange),
            sse_heartbeat: get("SSE_HEARTBEAT_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sse_heartbeat),
            stream_queue_capacity: get("STREAM_QUEUE_CAPACITY")
                .and_then(|c| c.parse::<usize>().ok())
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.stream_queue_capacity),
            daemon_socket: get("DAEMON_SOCKET"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            nats_url: None,
            exchange: "events".to_string(),
            sse_heartbeat: Duration::from_secs(15),
            stream_queue_capacity: streams::DEFAULT_QUEUE_CAPACITY,
            daemon_socket: None,
        }
    }
}
