//! SyncEngine - the main interface for glucose-sync.
//!
//! This module provides [`SyncEngine`], which keeps an application's glucose
//! history and a vendor health store in step.
//!
//! # Architecture
//!
//! The engine uses pure planners from glucose-core for the merge logic and
//! performs the I/O itself through three injected collaborators:
//!
//! ```text
//! Application ──save──► SyncEngine ──write──► SampleStore
//!                           ▲   │
//!        change notification│   ├──append/remove──► GlucoseRepository
//!        (observer task)    │   └──load/save──────► LedgerStore
//!                           │
//!                   glucose-core (plan_additions, deletion_batch)
//! ```
//!
//! Every merge runs under one per-engine lock, so deletion and addition
//! merges of a cycle, and consecutive cycles, never interleave their ledger
//! read-modify-write.
//!
//! # Example
//!
//! ```ignore
//! let engine = Arc::new(SyncEngine::new(
//!     SyncConfig::default(),
//!     store,
//!     repository,
//!     FileLedger::new("downloaded-samples.json"),
//! ));
//!
//! if engine.request_permission().await? {
//!     let observer = engine.start().await?;
//!     engine.save(&[GlucoseSample::recorded(Timestamp::now(), 112)]).await?;
//! }
//! ```

use glucose_sync_core::{deletion_batch, outbound, plan_additions, QueryWindow};
use glucose_sync_types::{
    AuthorizationState, ExternalSample, GlucoseSample, SampleError, SampleId, SampleKind,
    Timestamp,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::ledger::{LedgerError, LedgerStore};
use crate::observer::{spawn_observer, ObserverHandle};
use crate::repository::{GlucoseRepository, RepositoryError};
use crate::store::{SampleStore, StoreError};

/// The only sample kind the engine reads and writes.
const KIND: SampleKind = SampleKind::BloodGlucose;

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The platform has no health store.
    #[error("health data is not available on this device")]
    NotAvailable,

    /// Access has not been granted.
    #[error("not authorized: {0:?}")]
    NotAuthorized(AuthorizationState),

    /// A sample failed validation.
    #[error("invalid sample: {0}")]
    InvalidSample(#[from] SampleError),

    /// Health-store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Ledger persistence error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Repository error.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result of writing one sample.
#[derive(Debug)]
pub struct WriteOutcome {
    /// The sample's identifier.
    pub identifier: SampleId,
    /// Whether the write succeeded.
    pub result: Result<(), EngineError>,
}

impl WriteOutcome {
    /// Whether the write succeeded.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Counters from one addition merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Samples returned by the addition query.
    pub considered: usize,
    /// Dropped as device-entered or our own writes.
    pub filtered: usize,
    /// Dropped as already merged.
    pub duplicates: usize,
    /// Dropped as older than the ledger retention.
    pub expired: usize,
    /// Dropped for unusable quantities.
    pub invalid: usize,
    /// Appended to the repository.
    pub appended: usize,
    /// Appends the repository rejected (retried next cycle).
    pub failed: usize,
    /// Ledger size after the merge.
    pub ledger_size: usize,
}

/// Outcome of a full observation cycle.
///
/// The two halves are independent: a failed deletion merge does not stop
/// the addition merge, and vice versa.
#[derive(Debug)]
pub struct CycleReport {
    /// Number of repository samples removed.
    pub deletions: Result<usize, EngineError>,
    /// Addition merge counters.
    pub additions: Result<MergeReport, EngineError>,
}

impl CycleReport {
    /// Whether both halves succeeded.
    pub fn is_ok(&self) -> bool {
        self.deletions.is_ok() && self.additions.is_ok()
    }
}

/// The sync engine.
///
/// Owns the ledger read-modify-write for one health store. Create one
/// engine per store and share it behind an [`Arc`].
pub struct SyncEngine<S, R, L, C = SystemClock> {
    config: SyncConfig,
    store: S,
    repository: R,
    ledger: L,
    clock: C,
    merge_lock: Mutex<()>,
}

impl<S, R, L> SyncEngine<S, R, L, SystemClock>
where
    S: SampleStore,
    R: GlucoseRepository,
    L: LedgerStore,
{
    /// Create an engine using wall-clock time.
    pub fn new(config: SyncConfig, store: S, repository: R, ledger: L) -> Self {
        Self::with_clock(config, store, repository, ledger, SystemClock)
    }
}

impl<S, R, L, C> SyncEngine<S, R, L, C>
where
    S: SampleStore,
    R: GlucoseRepository,
    L: LedgerStore,
    C: Clock,
{
    /// Create an engine with an explicit clock.
    pub fn with_clock(config: SyncConfig, store: S, repository: R, ledger: L, clock: C) -> Self {
        Self {
            config,
            store,
            repository,
            ledger,
            clock,
            merge_lock: Mutex::new(()),
        }
    }

    /// Whether the store is present and access is granted.
    pub fn is_authorized(&self) -> bool {
        self.check_authorized().is_ok()
    }

    fn check_authorized(&self) -> Result<(), EngineError> {
        if !self.store.is_available() {
            return Err(EngineError::NotAvailable);
        }
        let state = self.store.authorization_state(KIND);
        if !state.is_authorized() {
            return Err(EngineError::NotAuthorized(state));
        }
        Ok(())
    }

    /// Ask the user for access to glucose samples.
    ///
    /// Returns whether access was granted.
    pub async fn request_permission(&self) -> Result<bool, EngineError> {
        if !self.store.is_available() {
            return Err(EngineError::NotAvailable);
        }
        let granted = self.store.request_authorization(&[KIND]).await?;
        tracing::info!("Glucose authorization request completed (granted: {})", granted);
        Ok(granted)
    }

    /// Write locally recorded samples to the health store.
    ///
    /// One write per sample, in order. Each sample gets its own outcome; a
    /// failed or invalid sample never stops the rest of the batch, and
    /// samples written before a failure stay written.
    ///
    /// # Errors
    ///
    /// Fails as a whole only when the store is unavailable or unauthorized.
    pub async fn save(&self, samples: &[GlucoseSample]) -> Result<Vec<WriteOutcome>, EngineError> {
        self.check_authorized()?;

        let mut outcomes = Vec::with_capacity(samples.len());
        for sample in samples {
            let result = match outbound::to_external(sample, &self.config.provenance) {
                Ok(record) => self.store.write(record).await.map_err(EngineError::from),
                Err(e) => Err(EngineError::from(e)),
            };

            if let Err(e) = &result {
                tracing::warn!("Failed to write sample {}: {}", sample.identifier, e);
            }
            outcomes.push(WriteOutcome {
                identifier: sample.identifier.clone(),
                result,
            });
        }

        let written = outcomes.iter().filter(|o| o.is_ok()).count();
        tracing::debug!("Wrote {}/{} glucose samples", written, samples.len());
        Ok(outcomes)
    }

    /// Register the change observer.
    ///
    /// Only registers when authorized. Background delivery is requested at
    /// the configured frequency; failure to enable it is logged and
    /// otherwise ignored.
    ///
    /// Authorization granted after this call does not register an observer
    /// retroactively; call `start` again.
    pub async fn start(self: &Arc<Self>) -> Result<ObserverHandle, EngineError>
    where
        S: 'static,
        R: 'static,
        L: 'static,
        C: 'static,
    {
        self.check_authorized()?;

        let subscription = self.store.subscribe(KIND).await?;

        let frequency = self.config.background_frequency;
        match self.store.enable_background_delivery(KIND, frequency).await {
            Ok(()) => tracing::info!("Background delivery enabled ({:?})", frequency),
            Err(e) => tracing::warn!("Failed to enable background delivery: {}", e),
        }

        Ok(spawn_observer(Arc::clone(self), subscription))
    }

    /// Run one observation cycle: query removed and added samples over the
    /// trailing window and merge both.
    pub async fn run_cycle(&self) -> CycleReport {
        let _guard = self.merge_lock.lock().await;

        let now = self.clock.now();
        let window = self.config.trailing_window().at(now);

        let deletions = match self.store.query_removed(KIND, window).await {
            Ok(removed) => self.merge_deletions_locked(&removed).await,
            Err(e) => Err(e.into()),
        };
        let additions = match self.store.query_added(KIND, window).await {
            Ok(added) => self.merge_additions_locked(&added, now).await,
            Err(e) => Err(e.into()),
        };

        CycleReport {
            deletions,
            additions,
        }
    }

    /// Propagate samples removed from the health store.
    ///
    /// Returns the number of repository samples removed.
    pub async fn merge_deletions(&self, removed: &[ExternalSample]) -> Result<usize, EngineError> {
        let _guard = self.merge_lock.lock().await;
        self.merge_deletions_locked(removed).await
    }

    /// Merge samples returned by an addition query.
    pub async fn merge_additions(
        &self,
        added: &[ExternalSample],
    ) -> Result<MergeReport, EngineError> {
        let _guard = self.merge_lock.lock().await;
        self.merge_additions_locked(added, self.clock.now()).await
    }

    /// Prune expired ledger entries without merging anything.
    ///
    /// Returns the number of entries removed.
    pub async fn prune_ledger(&self) -> Result<usize, EngineError> {
        let _guard = self.merge_lock.lock().await;

        let mut ledger = self.ledger.load().await?;
        let pruned = ledger.prune(self.cutoff(self.clock.now()));
        self.ledger.save(&ledger).await?;
        Ok(pruned)
    }

    /// The query window a cycle starting now would use.
    pub fn current_window(&self) -> QueryWindow {
        self.config.trailing_window().at(self.clock.now())
    }

    /// Engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The health store (for testing).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The repository (for testing).
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// The ledger store (for testing).
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    fn cutoff(&self, now: Timestamp) -> Timestamp {
        now.minus(self.config.retention())
    }

    async fn merge_deletions_locked(
        &self,
        removed: &[ExternalSample],
    ) -> Result<usize, EngineError> {
        let batch = deletion_batch(removed);
        if batch.is_empty() {
            return Ok(0);
        }

        let count = self.repository.remove(&batch).await?;
        tracing::info!(
            "Propagated {} deletions ({} local samples removed)",
            batch.len(),
            count
        );
        Ok(count)
    }

    async fn merge_additions_locked(
        &self,
        added: &[ExternalSample],
        now: Timestamp,
    ) -> Result<MergeReport, EngineError> {
        let cutoff = self.cutoff(now);
        let ledger = self.ledger.load().await?;
        let plan = plan_additions(
            added,
            &ledger,
            self.config.dedup_policy,
            &self.config.provenance,
            cutoff,
        );
        if plan.invalid > 0 {
            tracing::warn!("Skipped {} samples with unusable quantities", plan.invalid);
        }

        let mut report = MergeReport {
            considered: added.len(),
            filtered: plan.filtered,
            duplicates: plan.duplicates,
            expired: plan.expired,
            invalid: plan.invalid,
            ..MergeReport::default()
        };

        let mut merged = Vec::with_capacity(plan.appends.len());
        for sample in plan.appends {
            let entry = sample.ledger_entry();
            let identifier = sample.identifier.clone();
            match self.repository.append(sample).await {
                Ok(()) => {
                    report.appended += 1;
                    merged.extend(entry);
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Failed to append sample {}: {}", identifier, e);
                }
            }
        }

        let next = ledger.merged(merged, cutoff);
        self.ledger.save(&next).await?;
        report.ledger_size = next.len();

        tracing::debug!(
            "Addition merge: {} considered, {} appended, {} duplicates, {} filtered",
            report.considered,
            report.appended,
            report.duplicates,
            report.filtered
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::{FileLedger, MemoryLedger};
    use crate::repository::MemoryRepository;
    use crate::store::MockSampleStore;
    use glucose_sync_core::DedupPolicy;
    use glucose_sync_types::{metadata, LedgerEntry, SampleOrigin};
    use std::time::Duration;

    type TestEngine = SyncEngine<MockSampleStore, MemoryRepository, MemoryLedger, ManualClock>;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);
    const NOW_SECS: i64 = 1_700_000_000;

    fn now() -> Timestamp {
        Timestamp::from_secs(NOW_SECS)
    }

    fn ago(secs: i64) -> Timestamp {
        Timestamp::from_secs(NOW_SECS - secs)
    }

    fn engine_with(config: SyncConfig, ledger: MemoryLedger) -> TestEngine {
        SyncEngine::with_clock(
            config,
            MockSampleStore::authorized(),
            MemoryRepository::new(),
            ledger,
            ManualClock::new(now()),
        )
    }

    fn engine() -> TestEngine {
        engine_with(SyncConfig::default(), MemoryLedger::new())
    }

    fn user_sample(id: &str, at: Timestamp, quantity: f64) -> ExternalSample {
        ExternalSample::new(format!("{id}-raw"), at, quantity)
            .with_metadata(metadata::SYNC_IDENTIFIER, id)
            .with_metadata(metadata::WAS_USER_ENTERED, true)
    }

    // ===========================================
    // Permission Tests
    // ===========================================

    #[tokio::test]
    async fn request_permission_reports_grant() {
        let engine = engine_with(SyncConfig::default(), MemoryLedger::new());
        engine.store().set_authorization(AuthorizationState::Undetermined);

        assert!(!engine.is_authorized());
        assert!(engine.request_permission().await.unwrap());
        assert!(engine.is_authorized());
    }

    #[tokio::test]
    async fn request_permission_without_store_fails() {
        let engine = engine();
        engine.store().set_available(false);

        let result = engine.request_permission().await;
        assert!(matches!(result, Err(EngineError::NotAvailable)));
        assert_eq!(engine.store().authorization_requests(), 0);
    }

    // ===========================================
    // Outbound Write Tests
    // ===========================================

    #[tokio::test]
    async fn save_writes_each_sample_with_provenance() {
        let engine = engine();
        let samples = [
            GlucoseSample::recorded(ago(60), 110),
            GlucoseSample::recorded(ago(30), 120),
        ];

        let outcomes = engine.save(&samples).await.unwrap();

        assert!(outcomes.iter().all(WriteOutcome::is_ok));
        let written = engine.store().written();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].sync_identifier(), Some(samples[0].identifier.as_str()));
        assert_eq!(
            written[1]
                .metadata
                .get(metadata::PROVENANCE)
                .and_then(|v| v.as_text()),
            Some("glucose-sync")
        );
    }

    #[tokio::test]
    async fn partial_write_failure_is_per_sample() {
        let engine = engine();
        engine.store().fail_write_at(1);
        let samples = [
            GlucoseSample::recorded(ago(90), 100),
            GlucoseSample::recorded(ago(60), 110),
            GlucoseSample::recorded(ago(30), 120),
        ];

        let outcomes = engine.save(&samples).await.unwrap();

        let ok: Vec<bool> = outcomes.iter().map(WriteOutcome::is_ok).collect();
        assert_eq!(ok, vec![true, false, true]);
        assert!(matches!(
            outcomes[1].result,
            Err(EngineError::Store(StoreError::WriteFailed(_)))
        ));
        assert_eq!(outcomes[1].identifier, samples[1].identifier);
        assert_eq!(engine.store().write_calls(), 3);
        assert_eq!(engine.store().written().len(), 2);
    }

    #[tokio::test]
    async fn sample_without_value_is_rejected_before_writing() {
        let engine = engine();
        let mut missing = GlucoseSample::recorded(ago(60), 0);
        missing.value = None;
        let samples = [missing, GlucoseSample::recorded(ago(30), 120)];

        let outcomes = engine.save(&samples).await.unwrap();

        assert!(matches!(
            outcomes[0].result,
            Err(EngineError::InvalidSample(SampleError::MissingValue { .. }))
        ));
        assert!(outcomes[1].is_ok());
        // Only the valid sample reached the store.
        assert_eq!(engine.store().write_calls(), 1);
    }

    #[tokio::test]
    async fn save_requires_authorization() {
        for state in [AuthorizationState::Denied, AuthorizationState::Undetermined] {
            let engine = engine();
            engine.store().set_authorization(state);

            let result = engine.save(&[GlucoseSample::recorded(ago(1), 100)]).await;
            assert!(matches!(result, Err(EngineError::NotAuthorized(s)) if s == state));
            assert_eq!(engine.store().write_calls(), 0);
        }
    }

    // ===========================================
    // Addition Merge Tests
    // ===========================================

    #[tokio::test]
    async fn addition_merge_appends_new_user_samples() {
        let engine = engine();
        let added = [user_sample("a", ago(600), 98.6), user_sample("b", ago(300), 120.0)];

        let report = engine.merge_additions(&added).await.unwrap();

        assert_eq!(report.appended, 2);
        assert_eq!(report.ledger_size, 2);
        let a = engine.repository().get(&SampleId::from("a")).unwrap();
        assert_eq!(a.value, Some(99));
        assert_eq!(a.origin, SampleOrigin::UserEntered);
        assert_eq!(engine.ledger().saves(), 1);
    }

    #[tokio::test]
    async fn addition_merge_is_idempotent() {
        let engine = engine();
        let added = [user_sample("a", ago(600), 90.0), user_sample("b", ago(300), 100.0)];

        engine.merge_additions(&added).await.unwrap();
        let ledger_after_first = engine.ledger().snapshot();
        let appends_after_first = engine.repository().append_calls();

        let second = engine.merge_additions(&added).await.unwrap();

        assert_eq!(second.appended, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(engine.repository().append_calls(), appends_after_first);
        assert_eq!(engine.ledger().snapshot(), ledger_after_first);
    }

    #[tokio::test]
    async fn identifier_policy_dedups_conflicting_content() {
        let ledger = MemoryLedger::with_entries([LedgerEntry::new("A", ago(100), 90)]);
        let config = SyncConfig::default().with_dedup_policy(DedupPolicy::Identifier);
        let engine = engine_with(config, ledger);
        let added = [
            user_sample("A", ago(100), 90.0),
            user_sample("A", ago(100), 95.0),
            user_sample("B", ago(50), 100.0),
        ];

        let report = engine.merge_additions(&added).await.unwrap();

        assert_eq!(report.appended, 1);
        assert_eq!(engine.repository().append_calls(), 1);
        assert!(engine.repository().get(&SampleId::from("B")).is_some());
        assert!(engine.repository().get(&SampleId::from("A")).is_none());
    }

    #[tokio::test]
    async fn exact_policy_accepts_conflicting_content() {
        let ledger = MemoryLedger::with_entries([LedgerEntry::new("A", ago(100), 90)]);
        let engine = engine_with(SyncConfig::default(), ledger);
        let added = [
            user_sample("A", ago(100), 90.0),
            user_sample("A", ago(100), 95.0),
            user_sample("B", ago(50), 100.0),
        ];

        let report = engine.merge_additions(&added).await.unwrap();

        assert_eq!(report.appended, 2);
        assert_eq!(
            engine.repository().get(&SampleId::from("A")).unwrap().value,
            Some(95)
        );
        let ledger = engine.ledger().snapshot();
        assert!(ledger.contains(&LedgerEntry::new("A", ago(100), 90), DedupPolicy::Exact));
        assert!(ledger.contains(&LedgerEntry::new("A", ago(100), 95), DedupPolicy::Exact));
    }

    #[tokio::test]
    async fn device_entered_samples_are_not_imported() {
        let engine = engine();
        let device = ExternalSample::new("meter", ago(60), 130.0);

        let report = engine.merge_additions(&[device]).await.unwrap();

        assert_eq!(report.filtered, 1);
        assert!(engine.repository().is_empty());
        assert!(engine.ledger().snapshot().is_empty());
    }

    #[tokio::test]
    async fn ledger_is_pruned_without_new_data() {
        let ledger = MemoryLedger::with_entries([
            LedgerEntry::new("stale", ago(2 * 86_400), 90),
            LedgerEntry::new("fresh", ago(60), 100),
        ]);
        let engine = engine_with(SyncConfig::default(), ledger);

        let report = engine.merge_additions(&[]).await.unwrap();

        assert_eq!(report.ledger_size, 1);
        assert_eq!(
            engine.ledger().snapshot().to_vec(),
            vec![LedgerEntry::new("fresh", ago(60), 100)]
        );
    }

    #[tokio::test]
    async fn ledger_pruning_follows_the_clock() {
        let engine = engine();
        engine
            .merge_additions(&[user_sample("a", ago(60), 90.0)])
            .await
            .unwrap();
        assert_eq!(engine.ledger().snapshot().len(), 1);

        engine.clock.advance(DAY);
        engine.merge_additions(&[]).await.unwrap();
        assert!(engine.ledger().snapshot().is_empty());
    }

    #[tokio::test]
    async fn corrupt_ledger_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("downloaded-samples.json");
        tokio::fs::write(&path, b"[{\"identifier\": ").await.unwrap();
        let engine = SyncEngine::with_clock(
            SyncConfig::default(),
            MockSampleStore::authorized(),
            MemoryRepository::new(),
            FileLedger::new(&path),
            ManualClock::new(now()),
        );

        let report = engine
            .merge_additions(&[user_sample("a", ago(60), 90.0)])
            .await
            .unwrap();

        assert_eq!(report.appended, 1);
        assert_eq!(report.ledger_size, 1);
        let raw = tokio::fs::read(&path).await.unwrap();
        let entries: Vec<LedgerEntry> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(entries, vec![LedgerEntry::new("a", ago(60), 90)]);
    }

    #[tokio::test]
    async fn failed_append_is_retried_next_cycle() {
        let engine = engine();
        engine.repository().fail_next_append("disk full");
        let added = [user_sample("a", ago(60), 90.0)];

        let first = engine.merge_additions(&added).await.unwrap();
        assert_eq!(first.failed, 1);
        assert!(engine.ledger().snapshot().is_empty());

        let second = engine.merge_additions(&added).await.unwrap();
        assert_eq!(second.appended, 1);
        assert_eq!(engine.repository().len(), 1);
    }

    // ===========================================
    // Deletion Merge Tests
    // ===========================================

    #[tokio::test]
    async fn deletion_merge_removes_by_sync_identifier_or_raw_id() {
        let engine = engine();
        let x = ExternalSample::new("X-raw", ago(60), 90.0)
            .with_metadata(metadata::SYNC_IDENTIFIER, "abc");
        let y = ExternalSample::new("Y-raw", ago(30), 90.0);

        engine.merge_deletions(&[x, y]).await.unwrap();

        let removals = engine.repository().removals();
        assert_eq!(removals.len(), 1, "one repository call per batch");
        assert_eq!(
            removals[0].identifiers(),
            &[SampleId::from("abc"), SampleId::from("Y-raw")]
        );
    }

    #[tokio::test]
    async fn empty_deletion_skips_repository() {
        let engine = engine();
        assert_eq!(engine.merge_deletions(&[]).await.unwrap(), 0);
        assert!(engine.repository().removals().is_empty());
    }

    // ===========================================
    // Cycle Tests
    // ===========================================

    #[tokio::test]
    async fn cycle_queries_trailing_window() {
        let engine = engine();

        let report = engine.run_cycle().await;

        assert!(report.is_ok());
        let expected = QueryWindow { start: now().minus(DAY) };
        assert_eq!(engine.store().queried_windows(), vec![expected, expected]);
    }

    #[tokio::test]
    async fn cycle_imports_user_entries_and_skips_own_writes() {
        let engine = engine();
        engine
            .save(&[GlucoseSample::recorded(ago(120), 140)])
            .await
            .unwrap();
        engine.store().insert(user_sample("typed", ago(60), 101.0));

        let report = engine.run_cycle().await;

        let additions = report.additions.unwrap();
        assert_eq!(additions.considered, 2);
        assert_eq!(additions.filtered, 1);
        assert_eq!(additions.appended, 1);
        assert!(engine.repository().get(&SampleId::from("typed")).is_some());
    }

    #[tokio::test]
    async fn cycle_propagates_store_deletion() {
        let engine = engine();
        engine.store().insert(user_sample("typed", ago(60), 101.0));
        engine.run_cycle().await;
        assert_eq!(engine.repository().len(), 1);

        engine.store().delete("typed-raw");
        let report = engine.run_cycle().await;

        assert_eq!(report.deletions.unwrap(), 1);
        assert!(engine.repository().is_empty());
    }

    #[tokio::test]
    async fn failed_deletion_query_does_not_block_additions() {
        let engine = engine();
        engine.store().fail_next_query_removed("busy");
        engine.store().insert(user_sample("typed", ago(60), 101.0));

        let report = engine.run_cycle().await;

        assert!(matches!(
            report.deletions,
            Err(EngineError::Store(StoreError::QueryFailed(_)))
        ));
        assert_eq!(report.additions.unwrap().appended, 1);
    }

    #[tokio::test]
    async fn concurrent_cycles_do_not_double_import() {
        let engine = Arc::new(engine());
        engine.store().insert(user_sample("a", ago(60), 90.0));
        engine.store().insert(user_sample("b", ago(30), 95.0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.run_cycle().await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(engine.repository().append_calls(), 2);
        assert_eq!(engine.ledger().snapshot().len(), 2);
    }

    #[tokio::test]
    async fn prune_ledger_drops_expired_entries() {
        let ledger = MemoryLedger::with_entries([
            LedgerEntry::new("stale", ago(3 * 86_400), 90),
            LedgerEntry::new("fresh", ago(10), 100),
        ]);
        let engine = engine_with(SyncConfig::default(), ledger);

        assert_eq!(engine.prune_ledger().await.unwrap(), 1);
        assert_eq!(engine.ledger().snapshot().len(), 1);
    }

    // ===========================================
    // Startup Tests
    // ===========================================

    #[tokio::test]
    async fn start_requires_authorization() {
        let engine = Arc::new(engine());
        engine.store().set_authorization(AuthorizationState::Denied);

        let result = engine.start().await;
        assert!(matches!(
            result,
            Err(EngineError::NotAuthorized(AuthorizationState::Denied))
        ));
    }

    #[tokio::test]
    async fn start_reports_missing_type_as_error() {
        let engine = Arc::new(engine());
        engine.store().set_kind_unavailable(true);

        let result = engine.start().await;
        assert!(matches!(
            result,
            Err(EngineError::Store(StoreError::TypeUnavailable(SampleKind::BloodGlucose)))
        ));
    }

    #[tokio::test]
    async fn start_survives_background_delivery_failure() {
        let engine = Arc::new(engine());
        engine.store().fail_background_delivery("not entitled");

        let observer = engine.start().await.unwrap();
        assert!(engine.store().background_requests().is_empty());
        observer.stop();
    }

    #[tokio::test]
    async fn start_enables_background_delivery_at_configured_frequency() {
        let config = SyncConfig::default()
            .with_background_frequency(glucose_sync_core::BackgroundFrequency::Daily);
        let engine = Arc::new(engine_with(config, MemoryLedger::new()));

        let observer = engine.start().await.unwrap();
        assert_eq!(
            engine.store().background_requests(),
            vec![(
                SampleKind::BloodGlucose,
                glucose_sync_core::BackgroundFrequency::Daily
            )]
        );
        observer.stop();
    }
}
