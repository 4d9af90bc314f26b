//! Addition and deletion planning for an observation cycle.
//!
//! Given the raw results of the health-store queries, these functions work
//! out which samples must be appended to the local repository and which
//! identifiers must be removed. Running [`plan_additions`] twice on the same
//! input, with the ledger updated in between, yields an empty plan the
//! second time.

use glucose_sync_types::{
    DeletionBatch, ExternalSample, GlucoseSample, LedgerEntry, SampleOrigin, Timestamp,
};

use crate::ledger::{DedupPolicy, Ledger};

/// Result of planning an addition merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdditionPlan {
    /// New samples to append, in query order.
    pub appends: Vec<GlucoseSample>,
    /// Samples dropped because they were not entered by a person or carry
    /// our own provenance tag.
    pub filtered: usize,
    /// Samples dropped because the ledger (or an earlier sample in the same
    /// batch) already covers them.
    pub duplicates: usize,
    /// Samples dated before the ledger cutoff.
    pub expired: usize,
    /// Samples whose quantity could not be rounded to whole mg/dL.
    pub invalid: usize,
}

impl AdditionPlan {
    /// Whether there is nothing to append.
    pub fn is_empty(&self) -> bool {
        self.appends.is_empty()
    }
}

/// Decide which external samples are new.
///
/// A sample is appended when it
/// 1. was entered by a person and was not written by `provenance`,
/// 2. starts at or after `cutoff` (older ones would fall out of the ledger
///    immediately and be re-imported on the next cycle),
/// 3. has a usable quantity, and
/// 4. is not already in `ledger`, nor earlier in `samples`, under `policy`.
pub fn plan_additions(
    samples: &[ExternalSample],
    ledger: &Ledger,
    policy: DedupPolicy,
    provenance: &str,
    cutoff: Timestamp,
) -> AdditionPlan {
    let mut plan = AdditionPlan::default();
    let mut accepted = Ledger::new();

    for sample in samples {
        if !sample.is_user_entered() || sample.provenance() == Some(provenance) {
            plan.filtered += 1;
            continue;
        }

        if sample.start < cutoff {
            plan.expired += 1;
            continue;
        }

        let value = match sample.rounded_value() {
            Ok(value) => value,
            Err(_) => {
                plan.invalid += 1;
                continue;
            }
        };

        let entry = LedgerEntry::new(sample.identifier(), sample.start, value);
        if ledger.contains(&entry, policy) || accepted.contains(&entry, policy) {
            plan.duplicates += 1;
            continue;
        }

        plan.appends.push(GlucoseSample::new(
            entry.identifier.clone(),
            entry.timestamp,
            entry.value,
            SampleOrigin::UserEntered,
        ));
        accepted.insert(entry);
    }

    plan
}

/// Collect the identifiers of removed samples.
///
/// The sync identifier in a record's metadata wins; records without one
/// fall back to the store's own uuid.
pub fn deletion_batch(removed: &[ExternalSample]) -> DeletionBatch {
    removed.iter().map(ExternalSample::identifier).collect()
}
