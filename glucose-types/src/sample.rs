//! Local sample types: what the application records and what the ledger keeps.

use serde::{Deserialize, Serialize};

use crate::{SampleId, Timestamp};

/// Kind of health-store sample this crate deals with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    /// Blood glucose concentration in mg/dL.
    BloodGlucose,
}

impl std::fmt::Display for SampleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleKind::BloodGlucose => f.write_str("blood_glucose"),
        }
    }
}

/// Authorization status reported by the health store for a sample kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationState {
    /// The user granted access.
    Authorized,
    /// The user refused access.
    Denied,
    /// The user has not been asked yet.
    Undetermined,
}

impl AuthorizationState {
    /// Whether observation and writes may proceed.
    ///
    /// `Denied` and `Undetermined` are treated the same.
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthorizationState::Authorized)
    }
}

/// Who produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleOrigin {
    /// Typed in by the user.
    UserEntered,
    /// Recorded by a meter, sensor or this application.
    DeviceEntered,
}

/// A blood glucose reading in the application's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlucoseSample {
    /// Stable identifier.
    pub identifier: SampleId,
    /// When the reading was taken.
    pub timestamp: Timestamp,
    /// Reading in mg/dL. Required before the sample can be written out.
    pub value: Option<u32>,
    /// Provenance of the reading.
    pub origin: SampleOrigin,
}

impl GlucoseSample {
    /// Create a sample with a known value.
    pub fn new(
        identifier: impl Into<SampleId>,
        timestamp: Timestamp,
        value: u32,
        origin: SampleOrigin,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            timestamp,
            value: Some(value),
            origin,
        }
    }

    /// Create a locally recorded sample with a fresh identifier.
    pub fn recorded(timestamp: Timestamp, value: u32) -> Self {
        Self::new(SampleId::generate(), timestamp, value, SampleOrigin::DeviceEntered)
    }

    /// The ledger entry for this sample, if it has a value.
    pub fn ledger_entry(&self) -> Option<LedgerEntry> {
        self.value.map(|value| LedgerEntry {
            identifier: self.identifier.clone(),
            timestamp: self.timestamp,
            value,
        })
    }
}

/// A record of an external sample that has already been merged.
///
/// Ordering and equality cover the full `(identifier, timestamp, value)`
/// tuple, so a set of entries is deduplicated on all three.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Identifier of the merged sample.
    pub identifier: SampleId,
    /// Sample time.
    pub timestamp: Timestamp,
    /// Rounded value in mg/dL.
    pub value: u32,
}

impl LedgerEntry {
    /// Create a new ledger entry.
    pub fn new(identifier: impl Into<SampleId>, timestamp: Timestamp, value: u32) -> Self {
        Self {
            identifier: identifier.into(),
            timestamp,
            value,
        }
    }
}

/// Identifiers of samples removed from the health store, consumed once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionBatch {
    identifiers: Vec<SampleId>,
}

impl DeletionBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an identifier, ignoring repeats. Insertion order is kept.
    pub fn push(&mut self, identifier: SampleId) {
        if !self.identifiers.contains(&identifier) {
            self.identifiers.push(identifier);
        }
    }

    /// Whether `identifier` is part of this batch.
    pub fn contains(&self, identifier: &SampleId) -> bool {
        self.identifiers.contains(identifier)
    }

    /// Identifiers in insertion order.
    pub fn identifiers(&self) -> &[SampleId] {
        &self.identifiers
    }

    /// Number of identifiers.
    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    /// Whether the batch holds no identifiers.
    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

impl FromIterator<SampleId> for DeletionBatch {
    fn from_iter<I: IntoIterator<Item = SampleId>>(iter: I) -> Self {
        let mut batch = Self::new();
        for id in iter {
            batch.push(id);
        }
        batch
    }
}

impl IntoIterator for DeletionBatch {
    type Item = SampleId;
    type IntoIter = std::vec::IntoIter<SampleId>;

    fn into_iter(self) -> Self::IntoIter {
        self.identifiers.into_iter()
    }
}
