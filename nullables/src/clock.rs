//! Nullable clock: deterministic time for testing.

use bwlimit_types::{Clock, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A deterministic clock for testing.
///
/// Time only advances when you tell it to, or when a caller sleeps on it:
/// `sleep` returns immediately after moving the clock forward by the
/// requested duration. Every sleep is recorded for later assertions.
#[derive(Debug, Default)]
pub struct NullClock {
    current: AtomicU64,
    sleeps: Mutex<Vec<Duration>>,
}

impl NullClock {
    pub fn new(initial_millis: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_millis),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Advance time by a number of milliseconds.
    pub fn advance(&self, millis: u64) {
        self.current.fetch_add(millis, Ordering::SeqCst);
    }

    /// Set the time to a specific value.
    pub fn set(&self, millis: u64) {
        self.current.store(millis, Ordering::SeqCst);
    }

    /// Every duration passed to [`Clock::sleep`] so far, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Sum of all recorded sleeps.
    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }

    /// Forget recorded sleeps without touching the current time.
    pub fn clear_sleeps(&self) {
        self.sleeps.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Clock for NullClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.current.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.advance(millis);
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_moves_only_when_told() {
        let clock = NullClock::new(1_000);
        assert_eq!(clock.now().as_millis(), 1_000);
        assert_eq!(clock.now().as_millis(), 1_000);
        clock.advance(250);
        assert_eq!(clock.now().as_millis(), 1_250);
        clock.set(10);
        assert_eq!(clock.now().as_millis(), 10);
    }

    #[test]
    fn sleep_advances_and_records() {
        let clock = NullClock::new(0);
        clock.sleep(Duration::from_millis(100));
        clock.sleep(Duration::from_millis(40));
        assert_eq!(clock.now().as_millis(), 140);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(100), Duration::from_millis(40)]
        );
        assert_eq!(clock.total_slept(), Duration::from_millis(140));

        clock.clear_sleeps();
        assert!(clock.sleeps().is_empty());
        assert_eq!(clock.now().as_millis(), 140);
    }
}
