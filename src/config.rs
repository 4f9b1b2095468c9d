//! Runtime configuration loaded from a TOML file.
//!
//! Every field has a default, so an empty file (or no file) yields a working
//! setup. Values are checked by [`Config::validate`] before use.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::game::scoring::ScoringRule;

/// Longest accepted session lifetime, ten years.
pub const MAX_SESSION_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Largest accepted per-subscriber hub buffer.
pub const MAX_HUB_BUFFER: usize = 65_536;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    Validation { field: String, message: String },
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message: message.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Grid size assigned to new lobbies.
    pub default_grid_size: usize,
    pub min_grid_size: usize,
    pub max_grid_size: usize,
    /// Session lifetime in seconds.
    pub session_ttl_secs: u64,
    /// Events buffered per hub subscriber before the oldest are dropped.
    pub hub_buffer: usize,
    /// Word list to load instead of the embedded one. The embedded list is a
    /// small starter set for demos and tests; real play should point this at
    /// a full word list, one word per line.
    pub dictionary_path: Option<PathBuf>,
    /// SQLite database file. Falls back to the OS data directory.
    pub database_path: Option<PathBuf>,
    /// Strategy used when a bot is added without naming one.
    pub bot_strategy: String,
    pub scoring: ScoringRule,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_grid_size: 5,
            min_grid_size: 2,
            max_grid_size: 10,
            session_ttl_secs: 24 * 60 * 60,
            hub_buffer: 256,
            dictionary_path: None,
            database_path: None,
            bot_strategy: "random".to_string(),
            scoring: ScoringRule::default(),
        }
    }
}

impl Config {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_grid_size < 2 {
            return Err(invalid("min_grid_size", "must be at least 2"));
        }
        if self.min_grid_size > self.max_grid_size {
            return Err(invalid("max_grid_size", "must not be below min_grid_size"));
        }
        if !self.grid_size_allowed(self.default_grid_size) {
            return Err(invalid(
                "default_grid_size",
                format!(
                    "must be between {} and {}",
                    self.min_grid_size, self.max_grid_size
                ),
            ));
        }
        if self.session_ttl_secs == 0 {
            return Err(invalid("session_ttl_secs", "must be positive"));
        }
        if self.session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(invalid(
                "session_ttl_secs",
                format!("must be at most {}", MAX_SESSION_TTL_SECS),
            ));
        }
        if self.hub_buffer == 0 {
            return Err(invalid("hub_buffer", "must be positive"));
        }
        if self.hub_buffer > MAX_HUB_BUFFER {
            return Err(invalid(
                "hub_buffer",
                format!("must be at most {}", MAX_HUB_BUFFER),
            ));
        }
        if self.bot_strategy.trim().is_empty() {
            return Err(invalid("bot_strategy", "must not be empty"));
        }
        Ok(())
    }

    pub fn grid_size_allowed(&self, size: usize) -> bool {
        (self.min_grid_size..=self.max_grid_size).contains(&size)
    }

    /// Session lifetime as a duration. Fails instead of wrapping or
    /// panicking when the seconds do not fit.
    pub fn session_ttl(&self) -> Result<chrono::Duration, ConfigError> {
        let out_of_range = || invalid("session_ttl_secs", "out of range");
        let secs = i64::try_from(self.session_ttl_secs).map_err(|_| out_of_range())?;
        chrono::Duration::try_seconds(secs).ok_or_else(out_of_range)
    }
}
