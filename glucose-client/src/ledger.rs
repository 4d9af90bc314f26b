//! Ledger persistence.
//!
//! The ledger is stored as a JSON array of `{identifier, timestamp, value}`
//! records in application-private storage. Each merge cycle replaces the
//! whole file. A missing or unreadable-as-JSON file loads as an empty
//! ledger: the worst case is re-importing samples still in the window,
//! which the repository treats as replacements.

use async_trait::async_trait;
use glucose_sync_core::Ledger;
use glucose_sync_types::LedgerEntry;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Ledger persistence errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Failed to read or write the ledger file.
    #[error("ledger I/O error at {path}: {source}")]
    Io {
        /// Path to the ledger file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to encode the ledger.
    #[error("failed to encode ledger: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persistent home of the downloaded-sample ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the ledger. Absent or corrupt data yields an empty ledger.
    async fn load(&self) -> Result<Ledger, LedgerError>;

    /// Replace the stored ledger with `ledger`.
    async fn save(&self, ledger: &Ledger) -> Result<(), LedgerError>;
}

/// Ledger stored in a JSON file.
///
/// Saves go to a sibling temp file that is then renamed over the target,
/// so a crash mid-write leaves the previous ledger intact.
#[derive(Debug, Clone)]
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    /// Create a ledger backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl LedgerStore for FileLedger {
    async fn load(&self) -> Result<Ledger, LedgerError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No ledger at {}, starting empty", self.path.display());
                return Ok(Ledger::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        match serde_json::from_slice::<Vec<LedgerEntry>>(&bytes) {
            Ok(entries) => Ok(entries.into_iter().collect()),
            Err(e) => {
                tracing::warn!(
                    "Ledger at {} is corrupt, resetting to empty: {}",
                    self.path.display(),
                    e
                );
                Ok(Ledger::new())
            }
        }
    }

    async fn save(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        let contents = serde_json::to_vec_pretty(&ledger.to_vec())?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, contents)
            .await
            .map_err(|e| self.io_error(e))?;
        set_file_permissions_0600(&temp)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        tracing::debug!("Saved {} ledger entries", ledger.len());
        Ok(())
    }
}

/// In-memory ledger for testing.
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    inner: Arc<Mutex<MemoryLedgerInner>>,
}

#[derive(Debug, Default)]
struct MemoryLedgerInner {
    ledger: Ledger,
    saves: usize,
}

impl MemoryLedger {
    /// Create an empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an in-memory ledger seeded with `entries`.
    pub fn with_entries(entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        let store = Self::new();
        store.inner.lock().unwrap().ledger = entries.into_iter().collect();
        store
    }

    /// Current contents.
    pub fn snapshot(&self) -> Ledger {
        self.inner.lock().unwrap().ledger.clone()
    }

    /// Number of `save` calls.
    pub fn saves(&self) -> usize {
        self.inner.lock().unwrap().saves
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn load(&self) -> Result<Ledger, LedgerError> {
        Ok(self.snapshot())
    }

    async fn save(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().unwrap();
        inner.ledger = ledger.clone();
        inner.saves += 1;
        Ok(())
    }
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
