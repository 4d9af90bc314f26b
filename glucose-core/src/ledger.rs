//! Downloaded-sample ledger for glucose-sync.
//!
//! The ledger remembers which external samples have already been merged
//! into the local repository so that a later observation cycle, which sees
//! the same trailing window again, does not import them twice.
//!
//! The ledger only needs to cover the query window: entries older than the
//! retention cutoff can never be returned by a query again and are pruned
//! on every cycle.

use glucose_sync_types::{LedgerEntry, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How an incoming sample is matched against already-merged samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupPolicy {
    /// Duplicate only if identifier, timestamp and value all match.
    ///
    /// A reused identifier with different content is imported again.
    #[default]
    Exact,
    /// Duplicate whenever the identifier was seen before.
    Identifier,
}

/// Set of merged samples, ordered by `(identifier, timestamp, value)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: BTreeSet<LedgerEntry>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `entry` counts as already merged under `policy`.
    pub fn contains(&self, entry: &LedgerEntry, policy: DedupPolicy) -> bool {
        match policy {
            DedupPolicy::Exact => self.entries.contains(entry),
            DedupPolicy::Identifier => self
                .entries
                .iter()
                .any(|e| e.identifier == entry.identifier),
        }
    }

    /// Record an entry. Returns `false` if the exact entry was already present.
    pub fn insert(&mut self, entry: LedgerEntry) -> bool {
        self.entries.insert(entry)
    }

    /// Union of this ledger and `new`, keeping only entries at or after `cutoff`.
    ///
    /// The result replaces the previous ledger wholesale.
    pub fn merged<I>(&self, new: I, cutoff: Timestamp) -> Ledger
    where
        I: IntoIterator<Item = LedgerEntry>,
    {
        let mut next = self.clone();
        next.entries.extend(new);
        next.prune(cutoff);
        next
    }

    /// Drop entries older than `cutoff`.
    ///
    /// Returns the number of entries removed.
    pub fn prune(&mut self, cutoff: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.timestamp >= cutoff);
        before - self.entries.len()
    }

    /// Iterate over entries in order.
    pub fn iter(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries as an ordered vector, the persisted form.
    pub fn to_vec(&self) -> Vec<LedgerEntry> {
        self.entries.iter().cloned().collect()
    }
}

impl FromIterator<LedgerEntry> for Ledger {
    fn from_iter<I: IntoIterator<Item = LedgerEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
