//! # glucose-types
//!
//! Data model shared by all glucose-sync crates:
//! - [`SampleId`], [`Timestamp`] - identity and time
//! - [`GlucoseSample`], [`LedgerEntry`], [`DeletionBatch`] - local sample types
//! - [`ExternalSample`], [`NewExternalSample`] - records as seen by the health store
//! - [`SampleError`] - validation errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod external;
mod ids;
mod sample;

pub use error::SampleError;
pub use external::{metadata, ExternalSample, MetadataValue, NewExternalSample, SYNC_VERSION};
pub use ids::{SampleId, Timestamp};
pub use sample::{
    AuthorizationState, DeletionBatch, GlucoseSample, LedgerEntry, SampleKind, SampleOrigin,
};
