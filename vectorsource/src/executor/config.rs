//! Dispatcher configuration.
//!
//! [`DispatchConfig`] is fixed at construction time. It can be built in code
//! or loaded from an INI file with a `[dispatch]` section:
//!
//! ```ini
//! [dispatch]
//! queue_capacity = 80
//! pool_size = 10
//! fetch_timeout_ms = 30000
//! ```
//!
//! `fetch_timeout_secs` is accepted as well; `fetch_timeout_ms` wins when
//! both are present. Files are always written with `fetch_timeout_ms` so
//! sub-second timeouts survive a save.

use std::path::Path;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

/// Default number of pending fetches the queue accepts.
pub const DEFAULT_QUEUE_CAPACITY: usize = 80;

/// Default number of fetch workers.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Default upper bound on a single provider call (in seconds).
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// INI section holding dispatcher settings.
pub const CONFIG_SECTION: &str = "dispatch";

const KEY_TIMEOUT_MS: &str = "fetch_timeout_ms";
const KEY_TIMEOUT_SECS: &str = "fetch_timeout_secs";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid_value(section: &str, key: &str, value: &str, reason: &str) -> Self {
        Self::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Sizing and timeout settings for a tile dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Maximum number of queued (not yet running) fetches.
    pub queue_capacity: usize,

    /// Number of long-lived workers.
    pub pool_size: usize,

    /// Upper bound on one provider call.
    pub fetch_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            pool_size: DEFAULT_POOL_SIZE,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

impl DispatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Checks that every setting is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity", "0", "must be greater than 0"));
        }
        if self.pool_size == 0 {
            return Err(invalid("pool_size", "0", "must be greater than 0"));
        }
        if self.fetch_timeout.is_zero() {
            return Err(invalid(KEY_TIMEOUT_MS, "0", "must be greater than 0"));
        }
        Ok(())
    }

    /// Loads configuration from an INI file.
    ///
    /// A missing file yields defaults. Keys absent from the file keep their
    /// default value.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        Self::from_ini(&ini)
    }

    /// Overlays the `[dispatch]` section of an INI document onto defaults.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some(CONFIG_SECTION)) {
            if let Some(v) = section.get("queue_capacity") {
                config.queue_capacity = parse_positive("queue_capacity", v)? as usize;
            }
            if let Some(v) = section.get("pool_size") {
                config.pool_size = parse_positive("pool_size", v)? as usize;
            }
            if let Some(v) = section.get(KEY_TIMEOUT_MS) {
                config.fetch_timeout = Duration::from_millis(parse_positive(KEY_TIMEOUT_MS, v)?);
            } else if let Some(v) = section.get(KEY_TIMEOUT_SECS) {
                config.fetch_timeout = Duration::from_secs(parse_positive(KEY_TIMEOUT_SECS, v)?);
            }
        }

        Ok(config)
    }

    /// Writes this configuration as an INI file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut ini = Ini::new();
        ini.with_section(Some(CONFIG_SECTION))
            .set("queue_capacity", self.queue_capacity.to_string())
            .set("pool_size", self.pool_size.to_string())
            .set(KEY_TIMEOUT_MS, self.fetch_timeout.as_millis().to_string());
        ini.write_to_file(path)?;
        Ok(())
    }
}

fn parse_positive(key: &str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(invalid(key, value, "must be greater than 0")),
        Ok(n) => Ok(n),
        Err(_) => Err(invalid(key, value, "expected a positive integer")),
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::invalid_value(CONFIG_SECTION, key, value, reason)
}
