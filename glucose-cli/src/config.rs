//! Configuration loading for glucose-cli.

use anyhow::{Context, Result};
use glucose_sync_client::Config;
use std::path::{Path, PathBuf};

/// Config file looked up in the data directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "glucose-sync.toml";

/// Load configuration.
///
/// An explicit path must exist. Without one, `glucose-sync.toml` in the
/// data directory is used if present, otherwise the defaults.
pub fn load(explicit: Option<&Path>, data_dir: &Path) -> Result<Config> {
    if let Some(path) = explicit {
        return Config::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()));
    }

    let fallback = data_dir.join(DEFAULT_CONFIG_FILE);
    if fallback.exists() {
        Config::from_file(&fallback).context("Invalid configuration in data directory")
    } else {
        Ok(Config::default())
    }
}

/// Resolve the ledger file, relative paths against the data directory.
pub fn ledger_path(config: &Config, data_dir: &Path) -> PathBuf {
    if config.ledger.path.is_absolute() {
        config.ledger.path.clone()
    } else {
        data_dir.join(&config.ledger.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glucose_sync_core::DedupPolicy;
    use tempfile::tempdir;

    #[test]
    fn defaults_without_config_file() {
        let dir = tempdir().unwrap();
        let config = load(None, dir.path()).unwrap();

        assert_eq!(config.sync.dedup_policy, DedupPolicy::Exact);
        assert_eq!(
            ledger_path(&config, dir.path()),
            dir.path().join("downloaded-samples.json")
        );
    }

    #[test]
    fn picks_up_config_in_data_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[sync]\ndedup_policy = \"identifier\"\n",
        )
        .unwrap();

        let config = load(None, dir.path()).unwrap();
        assert_eq!(config.sync.dedup_policy, DedupPolicy::Identifier);
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");

        assert!(load(Some(&missing), dir.path()).is_err());
    }

    #[test]
    fn absolute_ledger_path_is_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[ledger]\npath = \"/var/lib/glucose/ledger.json\"\n").unwrap();

        let config = load(Some(&path), dir.path()).unwrap();
        assert_eq!(
            ledger_path(&config, dir.path()),
            PathBuf::from("/var/lib/glucose/ledger.json")
        );
    }
}
