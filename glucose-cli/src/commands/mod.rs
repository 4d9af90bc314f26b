//! CLI command implementations.

pub mod ledger;
pub mod prune;
pub mod replay;
