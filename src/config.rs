//! Configuration file parser (`feedbridge.toml` by default).
//!
//! The config file is optional. A missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos. [`Config::validate`] runs after loading so that
//! a bad feed URL stops startup instead of failing forever in a worker.
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::feed::FeedSource;
use crate::irc::{ConnectionConfig, ReadTimeoutPolicy, RetryPolicy};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Values parsed but cannot be used.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level bridge configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server address as `host:port`.
    pub server: String,

    /// Nickname to register with.
    pub nick: String,

    /// Username sent in the USER command.
    pub user: String,

    /// Real name sent in the USER command.
    pub realname: String,

    /// Channels to join and announce feed items in.
    pub channels: Vec<String>,

    /// Feed URLs; `file://` paths are read from disk.
    pub feeds: Vec<String>,

    /// Minutes between polls of each feed.
    pub refetch_interval_minutes: u64,

    /// Seconds to wait after a failed dial.
    pub reconnect_delay_secs: u64,

    /// When set, the dial delay doubles after each failure up to this cap.
    pub reconnect_backoff_max_secs: Option<u64>,

    /// Seconds without any data from the server before a read times out.
    pub read_timeout_secs: u64,

    /// Reconnect on read timeout instead of waiting on the same socket.
    pub reconnect_on_read_timeout: bool,

    /// Bound each feed's seen-item cache to this many identities.
    /// Unbounded when unset.
    pub dedup_capacity: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: "localhost:6667".to_string(),
            nick: "feedbridge".to_string(),
            user: "feedbridge".to_string(),
            realname: "feedbridge".to_string(),
            channels: Vec::new(),
            feeds: Vec::new(),
            refetch_interval_minutes: 10,
            reconnect_delay_secs: 10,
            reconnect_backoff_max_secs: None,
            read_timeout_secs: 60,
            reconnect_on_read_timeout: false,
            dedup_capacity: None,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 12] = [
        "server",
        "nick",
        "user",
        "realname",
        "channels",
        "feeds",
        "refetch_interval_minutes",
        "reconnect_delay_secs",
        "reconnect_backoff_max_secs",
        "read_timeout_secs",
        "reconnect_on_read_timeout",
        "dedup_capacity",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading so a huge file is never loaded.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            server = %config.server,
            feeds = config.feeds.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Checks that the bridge can start with these values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.trim().is_empty() {
            return Err(ConfigError::Invalid("server must not be empty".to_string()));
        }
        if self.nick.trim().is_empty() || self.nick.contains(' ') {
            return Err(ConfigError::Invalid(
                "nick must be a single non-empty word".to_string(),
            ));
        }
        if self.refetch_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "refetch_interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.read_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "read_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.dedup_capacity == Some(0) {
            return Err(ConfigError::Invalid(
                "dedup_capacity must be at least 1 when set".to_string(),
            ));
        }
        if let Some(channel) = self.channels.iter().find(|c| c.is_empty() || c.contains(' ')) {
            return Err(ConfigError::Invalid(format!("invalid channel name '{}'", channel)));
        }
        self.feed_sources()?;
        Ok(())
    }

    pub fn feed_sources(&self) -> Result<Vec<FeedSource>, ConfigError> {
        self.feeds
            .iter()
            .map(|url| FeedSource::parse(url).map_err(|e| ConfigError::Invalid(e.to_string())))
            .collect()
    }

    pub fn refetch_interval(&self) -> Duration {
        Duration::from_secs(self.refetch_interval_minutes.saturating_mul(60))
    }

    pub fn dedup_capacity(&self) -> Option<NonZeroUsize> {
        self.dedup_capacity.and_then(NonZeroUsize::new)
    }

    pub fn connection(&self) -> ConnectionConfig {
        let delay = Duration::from_secs(self.reconnect_delay_secs);
        let retry = match self.reconnect_backoff_max_secs {
            Some(max) => RetryPolicy::Exponential {
                initial: delay,
                max: Duration::from_secs(max),
            },
            None => RetryPolicy::Fixed(delay),
        };

        ConnectionConfig {
            retry,
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            on_read_timeout: if self.reconnect_on_read_timeout {
                ReadTimeoutPolicy::Reconnect
            } else {
                ReadTimeoutPolicy::Continue
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
