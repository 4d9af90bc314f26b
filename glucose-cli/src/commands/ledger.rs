//! Print the downloaded-sample ledger.

use anyhow::{Context, Result};
use glucose_sync_client::{FileLedger, LedgerStore};
use std::path::Path;

/// Run the ledger command.
pub async fn run(ledger_path: &Path) -> Result<()> {
    let ledger = FileLedger::new(ledger_path)
        .load()
        .await
        .context("Failed to load ledger")?;

    println!("=== ledger: {} ===", ledger_path.display());
    println!();

    if ledger.is_empty() {
        println!("No downloaded samples recorded.");
        return Ok(());
    }

    println!("{:<38} {:>15} {:>6}", "IDENTIFIER", "TIMESTAMP (ms)", "MG/DL");
    for entry in ledger.iter() {
        println!(
            "{:<38} {:>15} {:>6}",
            entry.identifier.as_str(),
            entry.timestamp.millis(),
            entry.value
        );
    }
    println!();
    println!("{} entries", ledger.len());

    Ok(())
}
