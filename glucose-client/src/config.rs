//! Configuration for glucose-sync.
//!
//! Configuration is loaded from a TOML file with `[sync]` and `[ledger]`
//! sections. Every field has a default, so an empty file is valid.

use glucose_sync_core::{BackgroundFrequency, DedupPolicy, TrailingWindow};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Sync engine configuration.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Ledger storage configuration.
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// Sync engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Length of the trailing query window in seconds (default: 1 day).
    #[serde(default = "default_trailing_window_secs")]
    pub trailing_window_secs: u64,
    /// How long ledger entries are kept, in seconds (default: 1 day).
    #[serde(default = "default_ledger_retention_secs")]
    pub ledger_retention_secs: u64,
    /// Duplicate detection policy (default: exact).
    #[serde(default)]
    pub dedup_policy: DedupPolicy,
    /// Background delivery frequency (default: hourly).
    #[serde(default)]
    pub background_frequency: BackgroundFrequency,
    /// Provenance tag written on, and filtered from, our own samples.
    #[serde(default = "default_provenance")]
    pub provenance: String,
}

/// Ledger storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Ledger file; relative paths resolve against the data directory.
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

// Default value functions
fn default_trailing_window_secs() -> u64 {
    24 * 60 * 60 // 1 day
}

fn default_ledger_retention_secs() -> u64 {
    24 * 60 * 60 // 1 day
}

fn default_provenance() -> String {
    "glucose-sync".to_string()
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("downloaded-samples.json")
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            trailing_window_secs: default_trailing_window_secs(),
            ledger_retention_secs: default_ledger_retention_secs(),
            dedup_policy: DedupPolicy::default(),
            background_frequency: BackgroundFrequency::default(),
            provenance: default_provenance(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

impl SyncConfig {
    /// The trailing query window.
    pub fn trailing_window(&self) -> TrailingWindow {
        TrailingWindow::new(Duration::from_secs(self.trailing_window_secs))
    }

    /// How long ledger entries are kept.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.ledger_retention_secs)
    }

    /// Set the dedup policy.
    pub fn with_dedup_policy(mut self, policy: DedupPolicy) -> Self {
        self.dedup_policy = policy;
        self
    }

    /// Set the trailing window length.
    pub fn with_trailing_window(mut self, window: Duration) -> Self {
        self.trailing_window_secs = window.as_secs();
        self
    }

    /// Set the ledger retention.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.ledger_retention_secs = retention.as_secs();
        self
    }

    /// Set the background delivery frequency.
    pub fn with_background_frequency(mut self, frequency: BackgroundFrequency) -> Self {
        self.background_frequency = frequency;
        self
    }

    /// Set the provenance tag.
    pub fn with_provenance(mut self, provenance: &str) -> Self {
        self.provenance = provenance.to_string();
        self
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
