//! Configuration management for Toolyard.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, ToolyardError};

/// Prefix for environment overrides, e.g. `TOOLYARD_GUARD__MAX_ATTEMPTS=3`.
const ENV_PREFIX: &str = "TOOLYARD";

/// Longest accepted guard window or cool-down: one leap year.
pub const MAX_GUARD_SECS: u64 = 366 * 24 * 60 * 60;

/// Main configuration for Toolyard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolyardConfig {
    /// Login admission guard configuration
    #[serde(default)]
    pub guard: GuardConfig,

    /// Memoization store configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Login admission guard configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Failed attempts allowed inside the window before blocking
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Sliding window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Cool-down length in seconds once a client is blocked
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            window_secs: default_window_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    60
}

fn default_cooldown_secs() -> u64 {
    30 * 60
}

impl GuardConfig {
    /// Reject limits the guard cannot enforce.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ToolyardError::Config(
                "guard.max_attempts must be at least 1".to_string(),
            ));
        }
        check_guard_secs("window_secs", self.window_secs)?;
        check_guard_secs("cooldown_secs", self.cooldown_secs)
    }
}

fn check_guard_secs(field: &str, secs: u64) -> Result<()> {
    if secs == 0 || secs > MAX_GUARD_SECS {
        return Err(ToolyardError::Config(format!(
            "guard.{} must be between 1 and {}, got {}",
            field, MAX_GUARD_SECS, secs
        )));
    }
    Ok(())
}

/// Memoization store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding persisted `<key>.cache` files
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,

    /// Whether the disk tier is part of the lookup chain
    #[serde(default = "default_disk_enabled")]
    pub disk_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
            disk_enabled: default_disk_enabled(),
        }
    }
}

fn default_cache_directory() -> PathBuf {
    PathBuf::from(".cache")
}

fn default_disk_enabled() -> bool {
    true
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ToolyardConfig {
    /// Check every section for values the components cannot honor.
    pub fn validate(&self) -> Result<()> {
        self.guard.validate()
    }

    /// Load configuration from an optional file, then apply environment overrides.
    ///
    /// The file format is inferred from its extension.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ToolyardError::Config(e.to_string()))
    }
}
