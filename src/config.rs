//! Optional TOML configuration.
//!
//! A missing or empty file yields `Config::default()`; any subset of keys may
//! be given.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::fetch::DEFAULT_USER_AGENT;
use crate::sync::{DEFAULT_MAX_CONCURRENT, FeedOptions};

const KNOWN_KEYS: [&str; 6] = [
    "use_cache",
    "cache_ttl_secs",
    "timeout_secs",
    "user_agent",
    "max_concurrent",
    "data_dir",
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serve fresh cached feeds without a request
    pub use_cache: bool,
    pub cache_ttl_secs: u64,
    /// Per-attempt request timeout
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Feeds synced at once by `sync`
    pub max_concurrent: usize,
    /// Where the cache and subscriptions live; defaults to `~/.cache/castsync`
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let options = FeedOptions::default();
        Self {
            use_cache: options.use_cache,
            cache_ttl_secs: options.cache_ttl.as_secs(),
            timeout_secs: options.timeout.as_secs(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            data_dir: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys().filter(|k| !KNOWN_KEYS.contains(&k.as_str())) {
                tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            }
        }

        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Per-feed options derived from this configuration
    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions {
            use_cache: self.use_cache,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            user_agent: self.user_agent.clone(),
            etag: None,
            last_modified: None,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

fn default_data_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".cache").join("castsync"),
        None => PathBuf::from(".castsync"),
    }
}
