//! Background observer task.
//!
//! Consumes change notifications and runs one sync cycle per batch of
//! queued notifications. A cycle that has started always runs to the end;
//! stopping the observer only takes effect between cycles.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::engine::{CycleReport, SyncEngine};
use crate::ledger::LedgerStore;
use crate::repository::GlucoseRepository;
use crate::store::{SampleStore, Subscription};

/// Handle to a running observer task.
///
/// Dropping the handle detaches the task; it keeps running until the store
/// closes the subscription.
#[derive(Debug)]
pub struct ObserverHandle {
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl ObserverHandle {
    /// Ask the observer loop to exit.
    ///
    /// A cycle in progress finishes first, so the repository and the ledger
    /// are never left half-merged.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Whether the observer loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the observer loop to exit, after `stop` or once the store
    /// closes the subscription.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!("Observer task failed: {}", e);
        }
    }
}

/// Spawn the observer loop for `engine`.
///
/// Runs until the subscription ends or the handle is stopped.
pub fn spawn_observer<S, R, L, C>(
    engine: Arc<SyncEngine<S, R, L, C>>,
    mut subscription: Subscription,
) -> ObserverHandle
where
    S: SampleStore + 'static,
    R: GlucoseRepository + 'static,
    L: LedgerStore + 'static,
    C: Clock + 'static,
{
    let (shutdown, mut stopped) = watch::channel(false);

    let task = tokio::spawn(async move {
        tracing::info!("Glucose observer started");

        loop {
            let notification = tokio::select! {
                biased;
                Ok(()) = stopped.changed() => {
                    tracing::info!("Glucose observer stopped");
                    return;
                }
                notification = subscription.next() => notification,
            };
            let Some(notification) = notification else {
                break;
            };

            if let Err(e) = notification {
                tracing::warn!("Observer notification failed, skipping cycle: {}", e);
                continue;
            }

            let coalesced = drain_queued(&mut subscription);
            if coalesced > 0 {
                tracing::debug!("Coalesced {} queued notifications", coalesced);
            }

            let report = engine.run_cycle().await;
            log_cycle(&report);
        }

        tracing::info!("Glucose observer stopped (subscription closed)");
    });

    ObserverHandle { task, shutdown }
}

/// Consume notifications that queued up behind the current one. One cycle
/// covers all of them, since every cycle queries the whole window.
fn drain_queued(subscription: &mut Subscription) -> usize {
    let mut drained = 0;
    while let Some(notification) = subscription.try_next() {
        match notification {
            Ok(()) => drained += 1,
            Err(e) => tracing::warn!("Observer notification failed: {}", e),
        }
    }
    drained
}

fn log_cycle(report: &CycleReport) {
    if let Err(e) = &report.deletions {
        tracing::error!("Deletion merge failed: {}", e);
    }
    match &report.additions {
        Ok(merge) if merge.appended > 0 => {
            tracing::info!(
                "Imported {} glucose samples ({} in ledger)",
                merge.appended,
                merge.ledger_size
            );
        }
        Ok(_) => tracing::debug!("Cycle complete: nothing new"),
        Err(e) => tracing::error!("Addition merge failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use crate::clock::ManualClock;
    use crate::config::SyncConfig;
    use crate::engine::SyncEngine;
    use crate::ledger::MemoryLedger;
    use crate::repository::{GlucoseRepository, MemoryRepository, RepositoryError};
    use crate::store::MockSampleStore;
    use async_trait::async_trait;
    use glucose_sync_types::{
        metadata, DeletionBatch, ExternalSample, GlucoseSample, SampleId, Timestamp,
    };
    use std::sync::Arc;
    use std::time::Duration;

    type TestEngine = SyncEngine<MockSampleStore, MemoryRepository, MemoryLedger, ManualClock>;

    fn engine() -> Arc<TestEngine> {
        engine_with(MemoryRepository::new())
    }

    fn engine_with<R: GlucoseRepository>(
        repository: R,
    ) -> Arc<SyncEngine<MockSampleStore, R, MemoryLedger, ManualClock>> {
        Arc::new(SyncEngine::with_clock(
            SyncConfig::default(),
            MockSampleStore::authorized(),
            repository,
            MemoryLedger::new(),
            ManualClock::new(Timestamp::from_secs(1_700_000_000)),
        ))
    }

    /// Repository whose appends take a while to complete after storing.
    #[derive(Debug, Clone, Default)]
    struct SlowRepository {
        inner: MemoryRepository,
    }

    #[async_trait]
    impl GlucoseRepository for SlowRepository {
        async fn append(&self, sample: GlucoseSample) -> Result<(), RepositoryError> {
            self.inner.append(sample).await?;
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        }

        async fn remove(&self, batch: &DeletionBatch) -> Result<usize, RepositoryError> {
            self.inner.remove(batch).await
        }
    }

    fn typed(id: &str) -> ExternalSample {
        ExternalSample::new(
            format!("{id}-raw"),
            Timestamp::from_secs(1_700_000_000 - 60),
            104.0,
        )
        .with_metadata(metadata::SYNC_IDENTIFIER, id)
        .with_metadata(metadata::WAS_USER_ENTERED, true)
    }

    /// Poll until `condition` holds or about a second passes.
    async fn eventually(condition: impl Fn() -> bool) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn notification_triggers_cycle() {
        let engine = engine();
        let observer = engine.start().await.unwrap();

        engine.store().insert(typed("a"));
        engine.store().notify();

        let repo = engine.repository().clone();
        assert!(eventually(|| repo.get(&SampleId::from("a")).is_some()).await);
        observer.stop();
    }

    #[tokio::test]
    async fn error_notification_skips_cycle() {
        let engine = engine();
        let observer = engine.start().await.unwrap();

        engine.store().insert(typed("a"));
        engine.store().notify_error("observer query failed");
        engine.store().close_subscriptions();
        observer.join().await;

        assert!(engine.store().queried_windows().is_empty());
        assert!(engine.repository().is_empty());
    }

    #[tokio::test]
    async fn observer_continues_after_error_notification() {
        let engine = engine();
        let observer = engine.start().await.unwrap();

        engine.store().notify_error("transient");
        engine.store().insert(typed("a"));
        engine.store().notify();
        engine.store().close_subscriptions();
        observer.join().await;

        assert_eq!(engine.repository().len(), 1);
    }

    #[tokio::test]
    async fn observer_continues_after_failed_cycle() {
        let engine = engine();
        let observer = engine.start().await.unwrap();

        engine.store().fail_next_query_added("busy");
        engine.store().insert(typed("a"));
        engine.store().notify();

        let store = engine.store().clone();
        assert!(eventually(|| store.queried_windows().len() == 2).await);
        assert!(engine.repository().is_empty());

        engine.store().notify();
        engine.store().close_subscriptions();
        observer.join().await;

        assert_eq!(engine.repository().len(), 1);
        assert_eq!(engine.repository().append_calls(), 1);
    }

    #[tokio::test]
    async fn closed_subscription_ends_observer() {
        let engine = engine();
        let observer = engine.start().await.unwrap();

        engine.store().close_subscriptions();
        observer.join().await;
        assert!(engine.repository().is_empty());
    }

    #[tokio::test]
    async fn queued_notifications_share_one_cycle() {
        let engine = engine();
        let observer = engine.start().await.unwrap();

        engine.store().insert(typed("a"));
        for _ in 0..5 {
            engine.store().notify();
        }
        engine.store().close_subscriptions();
        observer.join().await;

        // One deletion query plus one addition query.
        assert_eq!(engine.store().queried_windows().len(), 2);
        assert_eq!(engine.repository().len(), 1);
    }

    #[tokio::test]
    async fn stop_ends_idle_observer() {
        let engine = engine();
        let observer = engine.start().await.unwrap();

        observer.stop();
        assert!(eventually(|| observer.is_finished()).await);
    }

    #[tokio::test]
    async fn stop_lets_running_cycle_finish() {
        let repository = SlowRepository::default();
        let engine = engine_with(repository.clone());
        let observer = engine.start().await.unwrap();

        engine.store().insert(typed("a"));
        engine.store().notify();

        // Stop while the append is still in flight.
        let appends = repository.inner.clone();
        assert!(eventually(|| appends.append_calls() == 1).await);
        observer.stop();
        observer.join().await;

        assert_eq!(engine.ledger().snapshot().len(), 1);

        let report = engine.run_cycle().await;
        assert_eq!(report.additions.unwrap().appended, 0);
        assert_eq!(repository.inner.append_calls(), 1);
    }
}
