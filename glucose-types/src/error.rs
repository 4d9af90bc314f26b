//! Error types for glucose-sync samples.

use thiserror::Error;

use crate::SampleId;

/// A sample that cannot be written or merged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    /// Outbound sample has no glucose value.
    #[error("sample {identifier} has no glucose value")]
    MissingValue {
        /// The offending sample.
        identifier: SampleId,
    },

    /// External quantity cannot be represented as whole mg/dL.
    #[error("sample {identifier} has invalid quantity {quantity}")]
    InvalidQuantity {
        /// The offending sample.
        identifier: SampleId,
        /// Quantity as reported by the store.
        quantity: f64,
    },
}
