//! The shared bandwidth limiter.
//!
//! One [`BandwidthLimiter`] is created per traffic class and shared by
//! `Arc` with every stream that should draw from the same budget. All
//! bookkeeping happens under a single mutex; blocking callers release the
//! lock before sleeping and re-check after waking, so a waiting thread never
//! holds up the others.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bwlimit_types::{Clock, LimiterKind, SystemClock, Timestamp};

use crate::state::{LimiterState, TICKS_PER_SECOND};
use crate::{BandwidthToken, LimiterStats};

/// Longest single sleep inside a blocking call.
pub const MAX_SINGLE_SLEEP_MILLIS: u64 = 1_000;
/// Total time a blocking call waits before settling for what it can get.
pub const MAX_TOTAL_WAIT_MILLIS: u64 = 4_000;

/// Token-bucket limiter enforcing a short-term ceiling and, optionally, a
/// long-term rolling average.
///
/// The limiter never returns an error. Budget exhaustion shows up as
/// latency on the blocking calls or as a partial grant on the non-blocking
/// one; negative byte counts are logged and ignored.
pub struct BandwidthLimiter {
    kind: LimiterKind,
    short_term_rate: i64,
    average_rate: i64,
    clock: Arc<dyn Clock>,
    state: Mutex<LimiterState>,
}

impl BandwidthLimiter {
    /// Create a limiter on the system clock.
    ///
    /// `short_term_rate` is the ceiling in bytes per second; zero or less
    /// disables throttling entirely. `average_rate` is the long-term average
    /// ceiling in bytes per second; zero or less disables the long-term
    /// policy.
    pub fn new(short_term_rate: i64, average_rate: i64, kind: LimiterKind) -> Self {
        Self::with_clock(
            short_term_rate,
            average_rate,
            kind,
            Arc::new(SystemClock::new()),
        )
    }

    /// Create a limiter reading time from `clock`.
    pub fn with_clock(
        short_term_rate: i64,
        average_rate: i64,
        kind: LimiterKind,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = LimiterState::new(short_term_rate, average_rate, kind, clock.now());
        tracing::debug!(
            %kind,
            short_term_rate,
            average_rate,
            per_tick = state.short_term_rate_per_tick,
            "bandwidth limiter created"
        );
        Self {
            kind,
            short_term_rate,
            average_rate,
            clock,
            state: Mutex::new(state),
        }
    }

    pub fn kind(&self) -> LimiterKind {
        self.kind
    }

    /// Configured short-term ceiling, bytes per second.
    pub fn short_term_rate(&self) -> i64 {
        self.short_term_rate
    }

    /// Configured long-term average, bytes per second.
    pub fn average_rate(&self) -> i64 {
        self.average_rate
    }

    pub fn is_unlimited(&self) -> bool {
        self.short_term_rate <= 0
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Debit `used_bytes`, sleeping until the bucket can cover them.
    ///
    /// Gives up waiting after [`MAX_TOTAL_WAIT_MILLIS`] and debits anyway,
    /// which can leave the bucket in deficit until later refills repay it.
    pub fn charge(&self, used_bytes: i64) {
        if used_bytes < 0 {
            tracing::warn!(kind = %self.kind, used_bytes, "ignoring negative bandwidth charge");
            return;
        }
        if self.is_unlimited() || used_bytes == 0 {
            return;
        }
        self.acquire_blocking(used_bytes, |state, _| {
            state.debit(used_bytes);
            used_bytes
        });
    }

    /// Debit `used_bytes` right away, the way an abandoned [`charge`](Self::charge)
    /// does. Lets a stream that has already waited out its allowance make
    /// progress on a budget that never refills.
    pub fn force_charge(&self, used_bytes: i64) {
        if used_bytes < 0 {
            tracing::warn!(kind = %self.kind, used_bytes, "ignoring negative bandwidth charge");
            return;
        }
        if self.is_unlimited() || used_bytes == 0 {
            return;
        }
        let mut state = self.lock();
        state.refill(self.clock.now());
        state.debit(used_bytes);
    }

    /// Debit up to `used_bytes` without ever sleeping.
    ///
    /// When the bucket holds more than requested the whole amount is
    /// granted. Otherwise whatever is available (possibly nothing) is
    /// granted, and the token says when to come back for the rest.
    pub fn charge_non_blocking(&self, used_bytes: i64) -> BandwidthToken {
        if used_bytes < 0 {
            tracing::warn!(kind = %self.kind, used_bytes, "ignoring negative bandwidth charge");
            return BandwidthToken::full(0);
        }
        if self.is_unlimited() || used_bytes == 0 {
            return BandwidthToken::full(used_bytes);
        }

        let mut state = self.lock();
        let now = self.clock.now();
        let paused = state.refill(now);
        if paused > 0 {
            return BandwidthToken::new(0, Some(now.saturating_add_millis(paused)));
        }

        if state.available > used_bytes {
            state.debit(used_bytes);
            return BandwidthToken::full(used_bytes);
        }

        let granted = state.available.clamp(0, used_bytes);
        state.debit(granted);
        let shortfall = used_bytes - granted;
        let sleep_until = (shortfall > 0).then(|| state.ready_at(shortfall, now));
        BandwidthToken::new(granted, sleep_until)
    }

    /// Reserve up to `desired_bytes`, sleeping until the bucket can cover
    /// them. Returns how many bytes were granted: the full amount, or less
    /// if the wait was abandoned.
    ///
    /// Pair with [`release`](Self::release) to hand back what was not used.
    pub fn reserve(&self, desired_bytes: i64) -> i64 {
        if desired_bytes < 0 {
            tracing::warn!(kind = %self.kind, desired_bytes, "ignoring negative bandwidth reservation");
            return 0;
        }
        if self.is_unlimited() || desired_bytes == 0 {
            return desired_bytes;
        }
        self.acquire_blocking(desired_bytes, |state, satisfied| {
            let granted = if satisfied {
                desired_bytes
            } else {
                state.available.clamp(0, desired_bytes)
            };
            state.debit(granted);
            granted
        })
    }

    /// Return reserved bytes that were not used.
    pub fn release(&self, unused_bytes: i64) {
        if unused_bytes < 0 {
            tracing::warn!(kind = %self.kind, unused_bytes, "ignoring negative bandwidth release");
            return;
        }
        if self.is_unlimited() || unused_bytes == 0 {
            return;
        }
        self.lock().credit(unused_bytes);
    }

    /// Poll the bucket until `needed` bytes are available, then hand the
    /// locked state to `grant`. The flag tells `grant` whether the bucket
    /// actually covers `needed` or the wait was abandoned.
    fn acquire_blocking<F>(&self, needed: i64, grant: F) -> i64
    where
        F: FnOnce(&mut LimiterState, bool) -> i64,
    {
        let started = self.clock.now();
        loop {
            let sleep_millis = {
                let mut state = self.lock();
                let now = self.clock.now();
                let paused = state.refill(now);
                if paused == 0 && state.available >= needed {
                    return grant(&mut *state, true);
                }

                let waited = now.millis_since(started);
                if waited >= MAX_TOTAL_WAIT_MILLIS {
                    tracing::debug!(
                        kind = %self.kind,
                        needed,
                        available = state.available,
                        waited_ms = waited,
                        "abandoning bandwidth wait"
                    );
                    return grant(&mut *state, false);
                }

                Self::sleep_millis(&state, needed, paused, now)
                    .min(MAX_SINGLE_SLEEP_MILLIS)
                    .min(MAX_TOTAL_WAIT_MILLIS - waited)
            };
            if sleep_millis > 0 {
                self.clock.sleep(Duration::from_millis(sleep_millis));
            }
        }
    }

    fn sleep_millis(state: &LimiterState, needed: i64, paused: u64, now: Timestamp) -> u64 {
        if paused > 0 {
            return paused;
        }
        if state.next_refill <= now {
            // Missed ticks are still being replayed; poll again right away.
            return 0;
        }
        let shortfall = needed.saturating_sub(state.available);
        state.ready_at(shortfall, now).millis_since(now)
    }

    /// Snapshot of the limiter's counters.
    pub fn stats(&self) -> LimiterStats {
        let state = self.lock();
        let now = self.clock.now();
        LimiterStats {
            kind: self.kind,
            short_term_rate: self.short_term_rate,
            average_rate: self.average_rate,
            short_term_rate_per_tick: state.short_term_rate_per_tick,
            ticks_per_second: TICKS_PER_SECOND,
            available: state.available,
            total_used: state.total_used,
            total_earned: state.total_earned,
            window_millis: now.millis_since(state.window_start),
            paused: state.paused_until.is_some_and(|until| until > now),
        }
    }
}

impl std::fmt::Debug for BandwidthLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BandwidthLimiter")
            .field("kind", &self.kind)
            .field("short_term_rate", &self.short_term_rate)
            .field("average_rate", &self.average_rate)
            .finish_non_exhaustive()
    }
}
