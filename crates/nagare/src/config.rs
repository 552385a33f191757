//! Configuration for nagare.
//!
//! Loaded once at startup from a JSON file and treated as immutable for the
//! lifetime of the process.

use crate::error::{NagareError, NagareResult};
use crate::paths::Paths;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default Redis URL for the implicit `default` connection.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Name of the connection used when none is selected.
pub const DEFAULT_CONNECTION: &str = "default";

/// Main nagare configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NagareConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Prefix of the checkpoint keys (`<prefix><channel>`).
    pub prefix: String,

    /// Encode and decode payloads with the binary pack format.
    /// Ignored when the `binary-pack` feature is not compiled in.
    pub support_binary_pack: bool,

    /// Route success records to `log_success_channel`.
    pub log_success: bool,

    /// Named sink receiving success records.
    pub log_success_channel: Option<String>,

    /// Route failure records to `log_error_channel`.
    pub log_errors: bool,

    /// Named sink receiving failure records.
    pub log_error_channel: Option<String>,

    /// Named sinks available to the logging flags.
    pub sinks: BTreeMap<String, SinkConfig>,

    /// Channel name -> ordered handler identifiers.
    pub channels: BTreeMap<String, Vec<String>>,

    /// Channel name -> max retained stream length. 0 or absent is unbounded.
    pub trim: BTreeMap<String, usize>,

    /// Blocking read timeout in milliseconds. Absent blocks indefinitely.
    pub block_timeout: Option<u64>,

    /// Redis connection selection.
    pub redis: RedisConfig,
}

/// Kind of a named outcome sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Structured `tracing` event on the `nagare::outcome` target.
    Tracing,
    /// One JSON record per line appended to `path`.
    Jsonl,
}

/// A named outcome sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    pub kind: SinkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Redis connection selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Name of the entry in `connections` to use.
    pub connection: String,
    /// Available connections by name.
    pub connections: BTreeMap<String, ConnectionConfig>,
}

/// A single Redis connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub url: String,
    /// Prefix the store applies to every physical key and stream name.
    #[serde(default)]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        let mut connections = BTreeMap::new();
        connections.insert(
            DEFAULT_CONNECTION.to_string(),
            ConnectionConfig {
                url: DEFAULT_REDIS_URL.to_string(),
                key_prefix: String::new(),
            },
        );

        Self {
            connection: DEFAULT_CONNECTION.to_string(),
            connections,
        }
    }
}

impl Default for NagareConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            prefix: String::new(),
            support_binary_pack: false,
            log_success: false,
            log_success_channel: None,
            log_errors: true,
            log_error_channel: None,
            sinks: BTreeMap::new(),
            channels: BTreeMap::new(),
            trim: BTreeMap::new(),
            block_timeout: None,
            redis: RedisConfig::default(),
        }
    }
}

impl NagareConfig {
    /// Load configuration from `~/.nagare/config.json`, falling back to defaults.
    pub fn load(paths: &Paths) -> NagareResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> NagareResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NagareConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Override configuration from environment variables.
    pub fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("NAGARE_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.override_redis_url(url);
        }
    }

    /// Replace the URL of the selected connection, creating it if missing.
    pub fn override_redis_url(&mut self, url: String) {
        self.redis
            .connections
            .entry(self.redis.connection.clone())
            .and_modify(|conn| conn.url = url.clone())
            .or_insert(ConnectionConfig {
                url,
                key_prefix: String::new(),
            });
    }

    /// The selected Redis connection.
    pub fn connection(&self) -> NagareResult<&ConnectionConfig> {
        self.redis
            .connections
            .get(&self.redis.connection)
            .ok_or_else(|| {
                NagareError::Config(format!(
                    "Redis connection '{}' is not defined",
                    self.redis.connection
                ))
            })
    }

    /// Blocking read timeout; `None` blocks indefinitely. A configured 0
    /// carries the store's `BLOCK 0` meaning and also blocks indefinitely.
    pub fn block_timeout(&self) -> Option<Duration> {
        self.block_timeout
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Configured trim cap for a channel (0 is unbounded).
    pub fn trim_for(&self, channel: &str) -> usize {
        self.trim.get(channel).copied().unwrap_or(0)
    }

    /// Check cross-references between sections.
    pub fn validate(&self) -> NagareResult<()> {
        self.connection()?;

        for (name, sink) in &self.sinks {
            if sink.kind == SinkKind::Jsonl && sink.path.is_none() {
                return Err(NagareError::Config(format!(
                    "Sink '{}' of kind jsonl requires a path",
                    name
                )));
            }
        }

        let referenced = [
            (self.log_success, &self.log_success_channel),
            (self.log_errors, &self.log_error_channel),
        ];
        for (enabled, sink) in referenced {
            if let (true, Some(name)) = (enabled, sink) {
                if !self.sinks.contains_key(name) {
                    return Err(NagareError::Config(format!(
                        "Logging sink '{}' is not defined",
                        name
                    )));
                }
            }
        }

        Ok(())
    }
}
