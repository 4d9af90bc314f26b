//! Conversion of locally recorded samples into health-store records.
//!
//! Every outbound record is tagged with the sample's stable identifier,
//! twice (as the sync identifier and as the external uuid), and with a
//! provenance marker. The addition merge relies on that marker, together
//! with `was_user_entered = false`, to avoid importing our own writes.

use glucose_sync_types::{
    metadata, GlucoseSample, MetadataValue, NewExternalSample, SampleError, SampleKind,
    SYNC_VERSION,
};
use std::collections::BTreeMap;

/// Build the outbound record for `sample`.
///
/// # Errors
///
/// Returns [`SampleError::MissingValue`] if the sample has no value. This
/// is checked before anything is built.
pub fn to_external(
    sample: &GlucoseSample,
    provenance: &str,
) -> Result<NewExternalSample, SampleError> {
    let value = sample.value.ok_or_else(|| SampleError::MissingValue {
        identifier: sample.identifier.clone(),
    })?;

    let id = sample.identifier.as_str();
    let mut tags = BTreeMap::new();
    tags.insert(metadata::SYNC_IDENTIFIER.to_string(), MetadataValue::from(id));
    tags.insert(metadata::SYNC_VERSION.to_string(), MetadataValue::from(SYNC_VERSION));
    tags.insert(metadata::EXTERNAL_UUID.to_string(), MetadataValue::from(id));
    tags.insert(metadata::WAS_USER_ENTERED.to_string(), MetadataValue::from(false));
    tags.insert(metadata::PROVENANCE.to_string(), MetadataValue::from(provenance));

    Ok(NewExternalSample {
        kind: SampleKind::BloodGlucose,
        start: sample.timestamp,
        quantity: f64::from(value),
        metadata: tags,
    })
}
