//! Timestamp type used throughout the limiter.
//!
//! Timestamps are milliseconds on a monotonic timeline whose origin is chosen
//! by the [`Clock`](crate::Clock) that produced them. They are only ever
//! compared against timestamps from the same clock.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A point on a monotonic timeline, in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The origin of the timeline.
    pub const ZERO: Self = Self(0);

    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn saturating_add_millis(&self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    pub fn saturating_add(&self, duration: Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.saturating_add_millis(millis)
    }

    /// Time remaining from `now` until this timestamp.
    pub fn duration_from(&self, now: Timestamp) -> Duration {
        Duration::from_millis(self.millis_since(now))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
