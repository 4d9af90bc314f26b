//! Trailing query windows and background delivery frequency.
//!
//! Every observation cycle looks back over a fixed trailing window. The
//! window uses a strict start date: a sample qualifies when it *starts*
//! inside the window. There is no upper bound, so samples dated in the
//! future still qualify.

use glucose_sync_types::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default trailing window: the last 24 hours.
pub const DEFAULT_TRAILING_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// A window anchored to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingWindow {
    length: Duration,
}

impl TrailingWindow {
    /// Create a trailing window of the given length.
    pub fn new(length: Duration) -> Self {
        Self { length }
    }

    /// Length of the window.
    pub fn length(&self) -> Duration {
        self.length
    }

    /// The concrete query window ending at `now`.
    pub fn at(&self, now: Timestamp) -> QueryWindow {
        QueryWindow {
            start: now.minus(self.length),
        }
    }
}

impl Default for TrailingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_TRAILING_WINDOW)
    }
}

/// Query predicate handed to the health store: `start >= self.start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    /// Earliest sample start date included.
    pub start: Timestamp,
}

impl QueryWindow {
    /// Whether a sample starting at `timestamp` falls inside the window.
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.start
    }
}

/// How often the platform may wake the app for background deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundFrequency {
    /// As soon as data changes.
    Immediate,
    /// At most once an hour.
    #[default]
    Hourly,
    /// At most once a day.
    Daily,
    /// At most once a week.
    Weekly,
}
