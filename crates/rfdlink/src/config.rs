// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link test configuration.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults (115200 baud, 100 ms cadence, port auto-discovery)
//! 2. a TOML file (`--config`, else the path in `RFDLINK_CONFIG`)
//! 3. `RFDLINK_PORT` / `RFDLINK_BAUD` environment variables
//! 4. command-line overrides applied by the binary
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud = 115200
//!
//! [sender]
//! interval_ms = 100
//!
//! [receiver]
//! progress_interval_secs = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the configuration file.
pub const ENV_CONFIG: &str = "RFDLINK_CONFIG";
/// Environment override for the serial port path.
pub const ENV_PORT: &str = "RFDLINK_PORT";
/// Environment override for the baud rate.
pub const ENV_BAUD: &str = "RFDLINK_BAUD";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTestConfig {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub sender: SenderConfig,

    #[serde(default)]
    pub receiver: ReceiverConfig,
}

/// Serial transport parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path. `None` means search for an RFD900.
    #[serde(default)]
    pub port: Option<String>,

    #[serde(default = "default_baud")]
    pub baud: u32,

    /// Upper bound on one blocking read.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Silence required around `+++` to enter AT command mode.
    #[serde(default = "default_at_guard_ms")]
    pub at_guard_ms: u64,
}

/// Sender cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

/// Receiver reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Running statistics period; 0 disables.
    #[serde(default = "default_progress_interval")]
    pub progress_interval_secs: u64,
}

fn default_baud() -> u32 {
    115_200
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_at_guard_ms() -> u64 {
    1000
}

fn default_interval_ms() -> u64 {
    100
}

fn default_progress_interval() -> u64 {
    5
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: default_baud(),
            read_timeout_ms: default_read_timeout_ms(),
            at_guard_ms: default_at_guard_ms(),
        }
    }
}

impl SerialConfig {
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    #[must_use]
    pub fn at_guard(&self) -> Duration {
        Duration::from_millis(self.at_guard_ms)
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl SenderConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            progress_interval_secs: default_progress_interval(),
        }
    }
}

impl ReceiverConfig {
    /// `None` when progress reporting is disabled.
    #[must_use]
    pub fn progress_interval(&self) -> Option<Duration> {
        (self.progress_interval_secs > 0).then(|| Duration::from_secs(self.progress_interval_secs))
    }
}

impl LinkTestConfig {
    /// Load and validate a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the full configuration for a run.
    ///
    /// Reads `path` if given, else the file named by `RFDLINK_CONFIG`, else
    /// starts from defaults; then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(ENV_CONFIG);
        let mut config = match path.or(env_path.as_deref().map(Path::new)) {
            Some(p) => {
                log::debug!("[CONFIG] loading {}", p.display());
                Self::from_file(p)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `RFDLINK_PORT` / `RFDLINK_BAUD` from `lookup`, then re-validate.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_PORT) {
            self.serial.port = Some(port);
        }
        if let Some(baud) = lookup(ENV_BAUD) {
            self.serial.baud = baud.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} is not a baud rate: {:?}", ENV_BAUD, baud))
            })?;
        }
        self.validate()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(port) = &self.serial.port {
            if port.trim().is_empty() {
                return Err(ConfigError::Invalid("serial.port is empty".into()));
            }
        }
        if self.serial.baud == 0 {
            return Err(ConfigError::Invalid("serial.baud must be positive".into()));
        }
        if !(1..=5000).contains(&self.serial.read_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "serial.read_timeout_ms must be within 1..=5000 (got {})",
                self.serial.read_timeout_ms
            )));
        }
        if self.sender.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sender.interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
