//! Health-store abstraction for glucose-sync.
//!
//! The vendor health platform is reached only through [`SampleStore`]. A
//! platform adapter implements it on top of the native API; tests and the
//! CLI use [`MockSampleStore`].
//!
//! # Design
//!
//! The platform's callback style maps onto:
//! - synchronous capability checks (`is_available`, `authorization_state`)
//! - async requests for writes and queries
//! - a [`Subscription`] stream of change notifications
//!
//! ```ignore
//! let store = MockSampleStore::new();
//! store.set_authorization(AuthorizationState::Authorized);
//! let mut changes = store.subscribe(SampleKind::BloodGlucose).await?;
//! store.notify();
//! assert!(changes.next().await.is_some());
//! ```

mod mock;

pub use mock::MockSampleStore;

use async_trait::async_trait;
use glucose_sync_core::{BackgroundFrequency, QueryWindow};
use glucose_sync_types::{AuthorizationState, ExternalSample, NewExternalSample, SampleKind};
use thiserror::Error;
use tokio::sync::mpsc;

/// Health-store errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The platform has no health store on this device.
    #[error("health data is not available on this device")]
    NotAvailable,

    /// The platform does not know the requested sample type.
    #[error("sample type unavailable: {0}")]
    TypeUnavailable(SampleKind),

    /// Authorization request failed.
    #[error("authorization request failed: {0}")]
    Authorization(String),

    /// A write was rejected.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A query failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// The change observer reported an error.
    #[error("observer error: {0}")]
    Observer(String),

    /// Background delivery could not be enabled.
    #[error("background delivery failed: {0}")]
    BackgroundDelivery(String),
}

/// One change notification: `Ok` when the store changed, `Err` when the
/// observer itself failed.
pub type ChangeNotification = Result<(), StoreError>;

/// Stream of change notifications for one sample kind.
///
/// Ends when the store drops its sending side.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<ChangeNotification>,
}

impl Subscription {
    /// Create a connected sender/subscription pair.
    pub fn channel() -> (mpsc::UnboundedSender<ChangeNotification>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { receiver })
    }

    /// Wait for the next notification. `None` once the store hangs up.
    pub async fn next(&mut self) -> Option<ChangeNotification> {
        self.receiver.recv().await
    }

    /// Take an already queued notification without waiting.
    pub fn try_next(&mut self) -> Option<ChangeNotification> {
        self.receiver.try_recv().ok()
    }
}

/// Capability interface onto the vendor health store.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Whether the platform offers a health store at all.
    fn is_available(&self) -> bool;

    /// Current authorization for writing `kind`.
    fn authorization_state(&self, kind: SampleKind) -> AuthorizationState;

    /// Ask the user for read/write access to `kinds`.
    ///
    /// Returns whether the request completed with access granted.
    async fn request_authorization(&self, kinds: &[SampleKind]) -> Result<bool, StoreError>;

    /// Write one sample.
    async fn write(&self, sample: NewExternalSample) -> Result<(), StoreError>;

    /// Subscribe to change notifications for `kind`.
    async fn subscribe(&self, kind: SampleKind) -> Result<Subscription, StoreError>;

    /// Samples of `kind` whose start date falls inside `window`.
    async fn query_added(
        &self,
        kind: SampleKind,
        window: QueryWindow,
    ) -> Result<Vec<ExternalSample>, StoreError>;

    /// Samples of `kind` inside `window` deleted since the previous call.
    async fn query_removed(
        &self,
        kind: SampleKind,
        window: QueryWindow,
    ) -> Result<Vec<ExternalSample>, StoreError>;

    /// Ask the platform to wake the app for changes at most every `frequency`.
    async fn enable_background_delivery(
        &self,
        kind: SampleKind,
        frequency: BackgroundFrequency,
    ) -> Result<(), StoreError>;
}
