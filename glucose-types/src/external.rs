//! Sample records as the health store sees them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{SampleError, SampleId, SampleKind, Timestamp};

/// Metadata keys written to and read from health-store records.
pub mod metadata {
    /// Identifier used by the store to collapse repeated writes of one sample.
    pub const SYNC_IDENTIFIER: &str = "sync_identifier";
    /// Version paired with [`SYNC_IDENTIFIER`]; higher versions replace lower ones.
    pub const SYNC_VERSION: &str = "sync_version";
    /// Our identifier, duplicated as the record's external id.
    pub const EXTERNAL_UUID: &str = "external_uuid";
    /// Set by the store when a person typed the value in.
    pub const WAS_USER_ENTERED: &str = "was_user_entered";
    /// Source tag for records written by this application.
    pub const PROVENANCE: &str = "provenance";
}

/// Sync version attached to every outbound write.
pub const SYNC_VERSION: i64 = 1;

/// A metadata value attached to a health-store record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Free text.
    Text(String),
}

impl MetadataValue {
    /// The text payload, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean payload, if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        MetadataValue::Integer(n)
    }
}

/// A sample returned by a health-store query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSample {
    /// Opaque id assigned by the store.
    pub uuid: String,
    /// Sample kind.
    pub kind: SampleKind,
    /// Start date of the sample.
    pub start: Timestamp,
    /// Quantity in mg/dL, as stored (not necessarily integral).
    pub quantity: f64,
    /// Record metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl ExternalSample {
    /// Create a record without metadata.
    pub fn new(uuid: impl Into<String>, start: Timestamp, quantity: f64) -> Self {
        Self {
            uuid: uuid.into(),
            kind: SampleKind::BloodGlucose,
            start,
            quantity,
            metadata: BTreeMap::new(),
        }
    }

    /// Builder-style metadata insertion.
    pub fn with_metadata(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// The sync identifier embedded in metadata, if any.
    pub fn sync_identifier(&self) -> Option<&str> {
        self.metadata
            .get(metadata::SYNC_IDENTIFIER)
            .and_then(MetadataValue::as_text)
    }

    /// Identifier used locally: the sync identifier, else the store's uuid.
    pub fn identifier(&self) -> SampleId {
        match self.sync_identifier() {
            Some(id) => SampleId::new(id),
            None => SampleId::new(self.uuid.clone()),
        }
    }

    /// Whether the store flagged this record as typed in by a person.
    pub fn is_user_entered(&self) -> bool {
        self.metadata
            .get(metadata::WAS_USER_ENTERED)
            .and_then(MetadataValue::as_bool)
            .unwrap_or(false)
    }

    /// The provenance tag, present on records this application wrote.
    pub fn provenance(&self) -> Option<&str> {
        self.metadata
            .get(metadata::PROVENANCE)
            .and_then(MetadataValue::as_text)
    }

    /// Quantity rounded to the nearest whole mg/dL.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::InvalidQuantity`] for NaN, infinite, negative
    /// or out-of-range quantities.
    pub fn rounded_value(&self) -> Result<u32, SampleError> {
        let rounded = self.quantity.round();
        if !rounded.is_finite() || rounded < 0.0 || rounded > f64::from(u32::MAX) {
            return Err(SampleError::InvalidQuantity {
                identifier: self.identifier(),
                quantity: self.quantity,
            });
        }
        Ok(rounded as u32)
    }
}

/// An outbound record ready to be written to the health store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExternalSample {
    /// Sample kind.
    pub kind: SampleKind,
    /// Start date (and end date; glucose samples are instantaneous).
    pub start: Timestamp,
    /// Quantity in mg/dL.
    pub quantity: f64,
    /// Record metadata, including sync identifier and provenance.
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl NewExternalSample {
    /// The sync identifier this record will be written under.
    pub fn sync_identifier(&self) -> Option<&str> {
        self.metadata
            .get(metadata::SYNC_IDENTIFIER)
            .and_then(MetadataValue::as_text)
    }
}
