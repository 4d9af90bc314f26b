//! Replay exported health-store query results through one sync cycle.
//!
//! Input files are JSON arrays of store records:
//!
//! ```json
//! [{ "uuid": "4F1C..", "kind": "blood_glucose", "start": 1700000000000,
//!    "quantity": 104.0, "metadata": { "was_user_entered": true } }]
//! ```

use anyhow::{Context, Result};
use glucose_sync_client::{
    Clock, CycleReport, FileLedger, MemoryRepository, MockSampleStore, SyncConfig, SyncEngine,
};
use glucose_sync_types::ExternalSample;
use std::path::Path;

/// Run the replay command.
///
/// `added` samples are served by the addition query and `removed` samples
/// by the deletion query. The cycle runs against an in-memory repository
/// and the on-disk ledger, so repeated replays show deduplication.
pub async fn run<C: Clock>(
    config: SyncConfig,
    ledger_path: &Path,
    added: &Path,
    removed: Option<&Path>,
    clock: C,
) -> Result<CycleReport> {
    let store = MockSampleStore::authorized();
    for sample in read_samples(added).await? {
        store.insert(sample);
    }
    if let Some(path) = removed {
        for sample in read_samples(path).await? {
            store.queue_removed(sample);
        }
    }

    let repository = MemoryRepository::new();
    let engine = SyncEngine::with_clock(
        config,
        store,
        repository.clone(),
        FileLedger::new(ledger_path),
        clock,
    );

    println!(
        "Replaying against window starting at {} ms",
        engine.current_window().start.millis()
    );
    let report = engine.run_cycle().await;

    match &report.deletions {
        Ok(count) => println!("Deletions: {} local samples removed", count),
        Err(e) => println!("Deletions: FAILED ({})", e),
    }
    match &report.additions {
        Ok(merge) => {
            println!("Additions:");
            println!("  Considered: {}", merge.considered);
            println!("  Filtered:   {}", merge.filtered);
            println!("  Duplicates: {}", merge.duplicates);
            println!("  Expired:    {}", merge.expired);
            println!("  Invalid:    {}", merge.invalid);
            println!("  Appended:   {}", merge.appended);
            println!("  Ledger:     {} entries", merge.ledger_size);
        }
        Err(e) => println!("Additions: FAILED ({})", e),
    }

    for sample in repository.samples() {
        println!(
            "  + {} at {} ms: {} mg/dL",
            sample.identifier,
            sample.timestamp.millis(),
            sample.value.unwrap_or_default()
        );
    }

    Ok(report)
}

async fn read_samples(path: &Path) -> Result<Vec<ExternalSample>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Invalid sample export in {}", path.display()))
}
