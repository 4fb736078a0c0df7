//! Configuration management for gpslogger.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::position::Accuracy;
use crate::retention::{RetentionPolicy, DEFAULT_HORIZON_HOURS};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "gpslogger";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "locations.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `GPSLOGGER_`)
/// 2. TOML config file at `~/.config/gpslogger/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Capture configuration.
    pub capture: CaptureConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/gpslogger/locations.db`
    pub database_path: Option<PathBuf>,
    /// Retention horizon in hours; records older than this are purged at
    /// cold start.
    pub retention_hours: u32,
}

/// Capture-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Minimum movement in meters before a new reading is delivered.
    pub distance_filter_meters: f64,
    /// Desired position accuracy.
    pub desired_accuracy: Accuracy,
    /// Interval between simulated position updates in milliseconds.
    pub update_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Resolved to the data dir at runtime
            retention_hours: DEFAULT_HORIZON_HOURS,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            distance_filter_meters: 100.0,
            desired_accuracy: Accuracy::Best,
            update_interval_ms: 500,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("GPSLOGGER_").split("_"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage.retention_hours == 0 {
            return Err(Error::ConfigValidation {
                message: "retention_hours must be greater than 0".to_string(),
            });
        }

        if self.capture.update_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "update_interval_ms must be greater than 0".to_string(),
            });
        }

        if !self.capture.distance_filter_meters.is_finite()
            || self.capture.distance_filter_meters < 0.0
        {
            return Err(Error::ConfigValidation {
                message: format!(
                    "distance_filter_meters must be a non-negative number, got {}",
                    self.capture.distance_filter_meters
                ),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the retention policy derived from the configured horizon.
    #[must_use]
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::from_hours(self.storage.retention_hours)
    }

    /// Get the update interval as a Duration.
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.capture.update_interval_ms)
    }
}
