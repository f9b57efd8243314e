//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{AppError, Result};

/// Stale-session sweep thresholds and scheduling.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SweepConfig {
    /// Whether the background sweep is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds a `running` session may go without ingestion before it is
    /// failed with a timeout detail.
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_seconds: u64,
    /// Seconds between sweep passes.
    #[serde(default = "default_sweep_interval")]
    pub interval_seconds: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_threshold_seconds: default_idle_threshold(),
            interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_idle_threshold() -> u64 {
    900
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_http_port() -> u16 {
    8080
}

fn default_subscriber_queue_capacity() -> usize {
    64
}

fn default_db_path() -> PathBuf {
    PathBuf::from("applyflow.db")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// HTTP port for the gateway.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Path to the `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Bounded outbound queue size per live subscriber.
    #[serde(default = "default_subscriber_queue_capacity")]
    pub subscriber_queue_capacity: usize,
    /// Stale-session sweep settings.
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            db_path: default_db_path(),
            subscriber_queue_capacity: default_subscriber_queue_capacity(),
            sweep: SweepConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.subscriber_queue_capacity == 0 {
            return Err(AppError::Config(
                "subscriber_queue_capacity must be greater than zero".into(),
            ));
        }

        if self.sweep.enabled {
            if self.sweep.idle_threshold_seconds == 0 {
                return Err(AppError::Config(
                    "sweep.idle_threshold_seconds must be greater than zero".into(),
                ));
            }
            if self.sweep.interval_seconds == 0 {
                return Err(AppError::Config(
                    "sweep.interval_seconds must be greater than zero".into(),
                ));
            }
        }

        Ok(())
    }
}
