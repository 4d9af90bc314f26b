//! Prune expired ledger entries.

use anyhow::{Context, Result};
use glucose_sync_client::{
    Clock, FileLedger, MemoryRepository, MockSampleStore, SyncConfig, SyncEngine,
};
use std::path::Path;

/// Run the prune command.
///
/// Returns the number of entries removed.
pub async fn run<C: Clock>(config: SyncConfig, ledger_path: &Path, clock: C) -> Result<usize> {
    // Pruning never touches the store or repository.
    let engine = SyncEngine::with_clock(
        config,
        MockSampleStore::new(),
        MemoryRepository::new(),
        FileLedger::new(ledger_path),
        clock,
    );

    let pruned = engine
        .prune_ledger()
        .await
        .context("Failed to prune ledger")?;

    println!("Pruned {} expired ledger entries.", pruned);
    Ok(pruned)
}
