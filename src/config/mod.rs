//! Configuration module - environment variable parsing

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::server::ServerSettings;

/// Which operating profile the binary runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Aggregated,
    Direct,
}

impl FromStr for ServerMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aggregated" => Ok(Self::Aggregated),
            "direct" => Ok(Self::Direct),
            _ => Err(ConfigError::Invalid {
                key: "SERVER_MODE",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregated => f.write_str("aggregated"),
            Self::Direct => f.write_str("direct"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    Disque,
    /// In-process queue, nothing external to connect to
    Memory,
}

impl FromStr for QueueBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disque" => Ok(Self::Disque),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid {
                key: "QUEUE_BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Milliseconds between tick fires
    pub tick_interval_ms: u64,

    pub queue_host: String,
    pub queue_port: u16,
    /// Queue the intake pulls from
    pub queue_name: String,
    pub queue_backend: QueueBackend,
    pub fetch_batch_size: usize,
    /// How long one fetch may block server-side
    pub fetch_timeout_ms: u64,

    pub mode: ServerMode,
    /// 0 means no bound
    pub max_parallel_rooms: usize,
    /// Room every connection joins in the bundled binary
    pub default_room: String,

    /// Health endpoint binding address
    pub health_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            tick_interval_ms: parse_nonzero("TICK_INTERVAL_MS", var("TICK_INTERVAL_MS", "15"))?,

            queue_host: var("QUEUE_HOST", "127.0.0.1"),
            queue_port: parse("QUEUE_PORT", var("QUEUE_PORT", "7711"))?,
            queue_name: var("QUEUE_NAME", "room-server"),
            queue_backend: var("QUEUE_BACKEND", "disque").parse()?,
            fetch_batch_size: parse_nonzero("FETCH_BATCH_SIZE", var("FETCH_BATCH_SIZE", "100"))?,
            fetch_timeout_ms: parse("FETCH_TIMEOUT_MS", var("FETCH_TIMEOUT_MS", "1000"))?,

            mode: var("SERVER_MODE", "aggregated").parse()?,
            max_parallel_rooms: parse("MAX_PARALLEL_ROOMS", var("MAX_PARALLEL_ROOMS", "0"))?,
            default_room: var("DEFAULT_ROOM", "lobby"),

            health_addr: var("HEALTH_ADDR", "0.0.0.0:8080")
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: var("LOG_LEVEL", "info"),
        })
    }

    /// First command line argument overrides the tick interval when it is a
    /// positive number; anything else is ignored
    pub fn with_interval_arg(mut self, arg: Option<String>) -> Self {
        let ms = arg.and_then(|a| a.trim().parse::<u64>().ok());
        if let Some(ms) = ms.filter(|&ms| ms > 0) {
            self.tick_interval_ms = ms;
        }
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn server_settings(&self) -> ServerSettings {
        ServerSettings {
            tick_interval: self.tick_interval(),
            queues: vec![self.queue_name.clone()],
            fetch_batch_size: self.fetch_batch_size,
            max_parallel_rooms: self.max_parallel_rooms,
        }
    }
}

fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

/// Like [`parse`], but zero is rejected too
fn parse_nonzero<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
{
    let parsed: T = parse(key, value.clone())?;
    if parsed == T::default() {
        return Err(ConfigError::Invalid { key, value });
    }
    Ok(parsed)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("Invalid health address format")]
    InvalidAddress,
}
