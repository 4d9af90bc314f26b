//! # glucose-client
//!
//! Bidirectional sync between an application's glucose history and a vendor
//! health-data store.
//!
//! This is the library applications embed. It owns the I/O; the merge rules
//! live in `glucose-core`.
//!
//! ## Features
//!
//! - **Outbound writes**: locally recorded readings are tagged with a sync
//!   identifier and provenance marker and written one by one
//! - **Inbound merge**: user-entered samples from the store are imported
//!   exactly once, tracked by a time-bounded ledger
//! - **Deletion propagation**: samples removed from the store are removed
//!   locally by sync identifier
//! - **Store abstraction**: pluggable health store (platform adapter, mock)
//!
//! ## Example
//!
//! ```ignore
//! use glucose_sync_client::{
//!     FileLedger, MemoryRepository, MockSampleStore, SyncConfig, SyncEngine,
//! };
//! use std::sync::Arc;
//!
//! let engine = Arc::new(SyncEngine::new(
//!     SyncConfig::default(),
//!     MockSampleStore::new(),
//!     MemoryRepository::new(),
//!     FileLedger::new("downloaded-samples.json"),
//! ));
//!
//! if engine.request_permission().await? {
//!     let observer = engine.start().await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod observer;
pub mod repository;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError, LedgerConfig, SyncConfig};
pub use engine::{CycleReport, EngineError, MergeReport, SyncEngine, WriteOutcome};
pub use ledger::{FileLedger, LedgerError, LedgerStore, MemoryLedger};
pub use observer::ObserverHandle;
pub use repository::{GlucoseRepository, MemoryRepository, RepositoryError};
pub use store::{ChangeNotification, MockSampleStore, SampleStore, StoreError, Subscription};
