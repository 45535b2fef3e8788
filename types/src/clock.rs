//! Time source abstraction.
//!
//! The limiter never calls `Instant::now` or `thread::sleep` directly; it
//! goes through a [`Clock`] so tests can substitute a deterministic one.

use std::time::{Duration, Instant};

use crate::Timestamp;

/// A monotonic time source that can also suspend the calling thread.
pub trait Clock: Send + Sync {
    /// Current time on this clock's timeline.
    fn now(&self) -> Timestamp;

    /// Suspend the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`].
///
/// Timestamps count milliseconds from the moment the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        Timestamp::from_millis(millis)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
