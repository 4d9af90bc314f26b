//! Local glucose history.
//!
//! The application owns its canonical glucose history; the sync engine
//! only touches it through [`GlucoseRepository`]. [`MemoryRepository`] is an
//! in-memory implementation for tests and the CLI.

use async_trait::async_trait;
use glucose_sync_types::{DeletionBatch, GlucoseSample, SampleId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Repository errors.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The backing store rejected the operation.
    #[error("repository error: {0}")]
    Backend(String),
}

/// Durable store of the application's glucose readings, keyed by identifier.
#[async_trait]
pub trait GlucoseRepository: Send + Sync {
    /// Append one sample. A sample with the same identifier is replaced.
    async fn append(&self, sample: GlucoseSample) -> Result<(), RepositoryError>;

    /// Remove every sample whose identifier is in `batch`.
    ///
    /// Returns the number of samples removed.
    async fn remove(&self, batch: &DeletionBatch) -> Result<usize, RepositoryError>;
}

/// In-memory repository.
///
/// Clones share state. Besides storing samples it records every call so
/// tests can assert on the exact traffic the engine produced.
#[derive(Debug, Default, Clone)]
pub struct MemoryRepository {
    inner: Arc<Mutex<MemoryRepositoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryRepositoryInner {
    samples: HashMap<SampleId, GlucoseSample>,
    append_calls: usize,
    removals: Vec<DeletionBatch>,
    fail_next_append: Option<String>,
    fail_next_remove: Option<String>,
}

impl MemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// All samples, ordered by timestamp then identifier.
    pub fn samples(&self) -> Vec<GlucoseSample> {
        let inner = self.inner.lock().unwrap();
        let mut samples: Vec<_> = inner.samples.values().cloned().collect();
        samples.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        samples
    }

    /// Look up a sample by identifier.
    pub fn get(&self, identifier: &SampleId) -> Option<GlucoseSample> {
        self.inner.lock().unwrap().samples.get(identifier).cloned()
    }

    /// Number of stored samples.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().samples.len()
    }

    /// Whether the repository is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().samples.is_empty()
    }

    /// Number of `append` calls, including failed ones.
    pub fn append_calls(&self) -> usize {
        self.inner.lock().unwrap().append_calls
    }

    /// Every batch passed to `remove`, in call order.
    pub fn removals(&self) -> Vec<DeletionBatch> {
        self.inner.lock().unwrap().removals.clone()
    }

    /// Cause the next `append` to fail with the given error.
    pub fn fail_next_append(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_append = Some(error.to_string());
    }

    /// Cause the next `remove` to fail with the given error.
    pub fn fail_next_remove(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_remove = Some(error.to_string());
    }
}

#[async_trait]
impl GlucoseRepository for MemoryRepository {
    async fn append(&self, sample: GlucoseSample) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        inner.append_calls += 1;
        if let Some(error) = inner.fail_next_append.take() {
            return Err(RepositoryError::Backend(error));
        }
        inner.samples.insert(sample.identifier.clone(), sample);
        Ok(())
    }

    async fn remove(&self, batch: &DeletionBatch) -> Result<usize, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        inner.removals.push(batch.clone());
        if let Some(error) = inner.fail_next_remove.take() {
            return Err(RepositoryError::Backend(error));
        }

        let before = inner.samples.len();
        inner.samples.retain(|id, _| !batch.contains(id));
        Ok(before - inner.samples.len())
    }
}
