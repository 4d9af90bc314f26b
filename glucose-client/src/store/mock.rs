//! Mock health store for testing.
//!
//! Holds samples in memory, records writes and queries, and lets tests
//! inject failures and change notifications.

use super::{ChangeNotification, SampleStore, StoreError, Subscription};
use async_trait::async_trait;
use glucose_sync_core::{BackgroundFrequency, QueryWindow};
use glucose_sync_types::{AuthorizationState, ExternalSample, NewExternalSample, SampleKind};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Mock health store for testing.
///
/// Clones share state, so a test can keep one handle while the engine owns
/// another.
#[derive(Debug, Default)]
pub struct MockSampleStore {
    inner: Arc<Mutex<MockSampleStoreInner>>,
}

#[derive(Debug)]
struct MockSampleStoreInner {
    available: bool,
    authorization: AuthorizationState,
    grant_on_request: bool,
    authorization_requests: usize,
    samples: Vec<ExternalSample>,
    pending_removed: Vec<ExternalSample>,
    written: Vec<NewExternalSample>,
    write_calls: usize,
    fail_writes_at: HashSet<usize>,
    fail_next_write: Option<String>,
    fail_next_query_added: Option<String>,
    fail_next_query_removed: Option<String>,
    fail_background_delivery: Option<String>,
    kind_unavailable: bool,
    queried_windows: Vec<QueryWindow>,
    background_requests: Vec<(SampleKind, BackgroundFrequency)>,
    subscribers: Vec<mpsc::UnboundedSender<ChangeNotification>>,
    next_uuid: u64,
}

impl Default for MockSampleStoreInner {
    fn default() -> Self {
        Self {
            available: true,
            authorization: AuthorizationState::Undetermined,
            grant_on_request: true,
            authorization_requests: 0,
            samples: Vec::new(),
            pending_removed: Vec::new(),
            written: Vec::new(),
            write_calls: 0,
            fail_writes_at: HashSet::new(),
            fail_next_write: None,
            fail_next_query_added: None,
            fail_next_query_removed: None,
            fail_background_delivery: None,
            kind_unavailable: false,
            queried_windows: Vec::new(),
            background_requests: Vec::new(),
            subscribers: Vec::new(),
            next_uuid: 0,
        }
    }
}

impl MockSampleStore {
    /// Create a new mock store: available, authorization undetermined.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock store that is already authorized.
    pub fn authorized() -> Self {
        let store = Self::new();
        store.set_authorization(AuthorizationState::Authorized);
        store
    }

    /// Simulate a device without a health store.
    pub fn set_available(&self, available: bool) {
        self.inner.lock().unwrap().available = available;
    }

    /// Set the authorization state reported for every kind.
    pub fn set_authorization(&self, state: AuthorizationState) {
        self.inner.lock().unwrap().authorization = state;
    }

    /// Whether the next authorization request is granted (default: yes).
    pub fn grant_on_request(&self, grant: bool) {
        self.inner.lock().unwrap().grant_on_request = grant;
    }

    /// Number of authorization requests made.
    pub fn authorization_requests(&self) -> usize {
        self.inner.lock().unwrap().authorization_requests
    }

    /// Add a sample as if another source (usually the user) entered it.
    pub fn insert(&self, sample: ExternalSample) {
        self.inner.lock().unwrap().samples.push(sample);
    }

    /// Delete a stored sample by store uuid; it shows up in the next
    /// `query_removed`. Returns whether it existed.
    pub fn delete(&self, uuid: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.samples.iter().position(|s| s.uuid == uuid) {
            Some(index) => {
                let sample = inner.samples.remove(index);
                inner.pending_removed.push(sample);
                true
            }
            None => false,
        }
    }

    /// Queue a removed record directly.
    pub fn queue_removed(&self, sample: ExternalSample) {
        self.inner.lock().unwrap().pending_removed.push(sample);
    }

    /// Every record currently stored.
    pub fn samples(&self) -> Vec<ExternalSample> {
        self.inner.lock().unwrap().samples.clone()
    }

    /// Every successfully written record, in order.
    pub fn written(&self) -> Vec<NewExternalSample> {
        self.inner.lock().unwrap().written.clone()
    }

    /// Number of write calls, including failed ones.
    pub fn write_calls(&self) -> usize {
        self.inner.lock().unwrap().write_calls
    }

    /// Fail the write call with zero-based index `index`.
    pub fn fail_write_at(&self, index: usize) {
        self.inner.lock().unwrap().fail_writes_at.insert(index);
    }

    /// Cause the next write to fail with the given error.
    pub fn fail_next_write(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_write = Some(error.to_string());
    }

    /// Cause the next `query_added` to fail with the given error.
    pub fn fail_next_query_added(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_query_added = Some(error.to_string());
    }

    /// Cause the next `query_removed` to fail with the given error.
    pub fn fail_next_query_removed(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_query_removed = Some(error.to_string());
    }

    /// Cause background delivery registration to fail.
    pub fn fail_background_delivery(&self, error: &str) {
        self.inner.lock().unwrap().fail_background_delivery = Some(error.to_string());
    }

    /// Make `subscribe` report the sample type as unknown.
    pub fn set_kind_unavailable(&self, unavailable: bool) {
        self.inner.lock().unwrap().kind_unavailable = unavailable;
    }

    /// Windows passed to queries, in call order.
    pub fn queried_windows(&self) -> Vec<QueryWindow> {
        self.inner.lock().unwrap().queried_windows.clone()
    }

    /// Background delivery registrations, in call order.
    pub fn background_requests(&self) -> Vec<(SampleKind, BackgroundFrequency)> {
        self.inner.lock().unwrap().background_requests.clone()
    }

    /// Deliver a change notification to every live subscription.
    pub fn notify(&self) {
        self.broadcast(Ok(()));
    }

    /// Deliver an observer error to every live subscription.
    pub fn notify_error(&self, error: &str) {
        self.broadcast(Err(StoreError::Observer(error.to_string())));
    }

    /// Drop all subscriptions, ending their streams.
    pub fn close_subscriptions(&self) {
        self.inner.lock().unwrap().subscribers.clear();
    }

    fn broadcast(&self, notification: ChangeNotification) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .subscribers
            .retain(|sender| sender.send(notification.clone()).is_ok());
    }
}

impl Clone for MockSampleStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl SampleStore for MockSampleStore {
    fn is_available(&self) -> bool {
        self.inner.lock().unwrap().available
    }

    fn authorization_state(&self, _kind: SampleKind) -> AuthorizationState {
        self.inner.lock().unwrap().authorization
    }

    async fn request_authorization(&self, _kinds: &[SampleKind]) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.available {
            return Err(StoreError::NotAvailable);
        }

        inner.authorization_requests += 1;
        inner.authorization = if inner.grant_on_request {
            AuthorizationState::Authorized
        } else {
            AuthorizationState::Denied
        };
        Ok(inner.grant_on_request)
    }

    async fn write(&self, sample: NewExternalSample) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let index = inner.write_calls;
        inner.write_calls += 1;

        // Check for forced failure
        if inner.fail_writes_at.remove(&index) {
            return Err(StoreError::WriteFailed(format!("write {index} rejected")));
        }
        if let Some(error) = inner.fail_next_write.take() {
            return Err(StoreError::WriteFailed(error));
        }

        inner.next_uuid += 1;
        let stored = ExternalSample {
            uuid: format!("mock-{}", inner.next_uuid),
            kind: sample.kind,
            start: sample.start,
            quantity: sample.quantity,
            metadata: sample.metadata.clone(),
        };
        inner.samples.push(stored);
        inner.written.push(sample);
        Ok(())
    }

    async fn subscribe(&self, kind: SampleKind) -> Result<Subscription, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.kind_unavailable {
            return Err(StoreError::TypeUnavailable(kind));
        }

        let (sender, subscription) = Subscription::channel();
        inner.subscribers.push(sender);
        Ok(subscription)
    }

    async fn query_added(
        &self,
        kind: SampleKind,
        window: QueryWindow,
    ) -> Result<Vec<ExternalSample>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.queried_windows.push(window);

        if let Some(error) = inner.fail_next_query_added.take() {
            return Err(StoreError::QueryFailed(error));
        }

        Ok(inner
            .samples
            .iter()
            .filter(|s| s.kind == kind && window.contains(s.start))
            .cloned()
            .collect())
    }

    async fn query_removed(
        &self,
        kind: SampleKind,
        window: QueryWindow,
    ) -> Result<Vec<ExternalSample>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.queried_windows.push(window);

        if let Some(error) = inner.fail_next_query_removed.take() {
            return Err(StoreError::QueryFailed(error));
        }

        let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.pending_removed)
            .into_iter()
            .partition(|s| s.kind == kind && window.contains(s.start));
        inner.pending_removed = rest;
        Ok(matching)
    }

    async fn enable_background_delivery(
        &self,
        kind: SampleKind,
        frequency: BackgroundFrequency,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_background_delivery.take() {
            return Err(StoreError::BackgroundDelivery(error));
        }
        inner.background_requests.push((kind, frequency));
        Ok(())
    }
}
