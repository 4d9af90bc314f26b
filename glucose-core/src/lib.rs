//! # glucose-core
//!
//! Pure logic for glucose-sync (no I/O, instant tests).
//!
//! This crate decides *what* a sync cycle should do: which external samples
//! are new, which identifiers were deleted, what the ledger looks like
//! afterwards and how outbound samples are tagged. It never touches the
//! health store, the repository or the disk.
//!
//! The actual I/O is performed by `glucose-client`, which feeds query
//! results in and carries the resulting plans out.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ledger;
pub mod merge;
pub mod outbound;
pub mod window;

pub use ledger::{DedupPolicy, Ledger};
pub use merge::{deletion_batch, plan_additions, AdditionPlan};
pub use outbound::to_external;
pub use window::{BackgroundFrequency, QueryWindow, TrailingWindow, DEFAULT_TRAILING_WINDOW};
