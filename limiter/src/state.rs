//! Token-bucket state and the two control loops that drive it.
//!
//! [`LimiterState`] is plain data with no locking and no clock of its own:
//! every method takes `now` explicitly. [`BandwidthLimiter`](crate::BandwidthLimiter)
//! owns one behind a mutex and feeds it timestamps from its clock.
//!
//! Two loops run inline whenever a consumer asks for budget:
//! - the short-term loop adds one tick of bytes each time a tick is due;
//! - the long-term loop, every [`AVERAGE_CHECK_INTERVAL_MILLIS`], compares
//!   bytes used in the rolling window against bytes earned at the average
//!   rate and adjusts the per-tick grant.

use std::time::Duration;

use bwlimit_types::{LimiterKind, Timestamp};
use bwlimit_utils::{format_bytes, format_duration, format_rate};

/// Short-term refills per second.
pub const TICKS_PER_SECOND: i64 = 10;
/// Length of one tick.
pub const TICK_MILLIS: u64 = 1000 / TICKS_PER_SECOND as u64;
/// How far behind the refill schedule may fall before it is resynchronised
/// to `now` instead of being replayed tick by tick.
pub const MAX_CATCH_UP_TICKS: u64 = 10;
/// Cadence of the long-term average check.
pub const AVERAGE_CHECK_INTERVAL_MILLIS: u64 = 10_000;
/// Length of the rolling accounting window.
pub const AVERAGE_WINDOW_MILLIS: u64 = 7 * 24 * 60 * 60 * 1000;
/// Cadence of the cumulative usage report.
pub const REPORT_INTERVAL_MILLIS: u64 = 60 * 60 * 1000;
/// Pause imposed on severe overuse.
pub const FORCED_PAUSE_MILLIS: u64 = 10_000;

pub const SEVERE_OVERUSE_BYTES: i64 = 400_000;
pub const MODERATE_OVERUSE_BYTES: i64 = 200_000;
pub const MILD_OVERUSE_BYTES: i64 = 100_000;

/// Outcome of one long-term check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AverageVerdict {
    /// Used less than earned: full short-term rate.
    Underused,
    /// Within the mild threshold: leave the rate alone.
    Tolerated,
    /// Half the configured short-term rate.
    Mild,
    /// Clamp to the average rate.
    Moderate,
    /// Clamp to the average rate and pause.
    Severe,
}

#[derive(Debug)]
pub(crate) struct LimiterState {
    kind: LimiterKind,
    original_short_term_rate: i64,
    original_average_rate: i64,

    pub(crate) short_term_rate_per_tick: i64,
    pub(crate) available: i64,
    pub(crate) next_refill: Timestamp,

    pub(crate) total_used: i64,
    pub(crate) total_earned: i64,
    pub(crate) window_start: Timestamp,
    pub(crate) next_average_check: Timestamp,
    pub(crate) next_report: Timestamp,
    pub(crate) paused_until: Option<Timestamp>,
}

impl LimiterState {
    /// Fresh state with an empty bucket whose first tick is due at `now`.
    pub(crate) fn new(
        short_term_rate: i64,
        average_rate: i64,
        kind: LimiterKind,
        now: Timestamp,
    ) -> Self {
        let mut per_tick = short_term_rate / TICKS_PER_SECOND;
        // A rate that rounds down to nothing would leave new streams unthrottled.
        if average_rate > 0 && per_tick < 1 {
            per_tick = 1;
        }
        Self {
            kind,
            original_short_term_rate: short_term_rate,
            original_average_rate: average_rate,
            short_term_rate_per_tick: per_tick,
            available: 0,
            next_refill: now,
            total_used: 0,
            total_earned: 0,
            window_start: now,
            next_average_check: now.saturating_add_millis(AVERAGE_CHECK_INTERVAL_MILLIS),
            next_report: now.saturating_add_millis(REPORT_INTERVAL_MILLIS),
            paused_until: None,
        }
    }

    fn full_rate_per_tick(&self) -> i64 {
        (self.original_short_term_rate / TICKS_PER_SECOND).max(1)
    }

    fn average_rate_per_tick(&self) -> i64 {
        (self.original_average_rate / TICKS_PER_SECOND).max(1)
    }

    /// Add one tick of budget if a tick is due, then run the long-term
    /// check. Returns how many milliseconds the caller must still hold off
    /// because of a forced pause; zero when there is none.
    pub(crate) fn refill(&mut self, now: Timestamp) -> u64 {
        if now >= self.next_refill {
            self.available = self.available.saturating_add(self.short_term_rate_per_tick);

            let behind = now.millis_since(self.next_refill);
            if behind > MAX_CATCH_UP_TICKS * TICK_MILLIS {
                tracing::trace!(
                    kind = %self.kind,
                    behind_ms = behind,
                    "refill schedule resynchronised"
                );
                self.next_refill = now.saturating_add_millis(TICK_MILLIS);
            } else {
                self.next_refill = self.next_refill.saturating_add_millis(TICK_MILLIS);
            }

            if self.original_average_rate > 0 {
                self.check_average(now);
            }
        }
        self.pause_remaining(now)
    }

    fn pause_remaining(&mut self, now: Timestamp) -> u64 {
        match self.paused_until {
            Some(until) if until > now => until.millis_since(now),
            Some(_) => {
                self.paused_until = None;
                0
            }
            None => 0,
        }
    }

    /// Long-term control loop. Only meaningful when an average is configured.
    pub(crate) fn check_average(&mut self, now: Timestamp) -> Option<AverageVerdict> {
        if now.millis_since(self.window_start) > AVERAGE_WINDOW_MILLIS {
            tracing::debug!(
                kind = %self.kind,
                used = %format_bytes(self.total_used),
                "accounting window elapsed, starting a new one"
            );
            self.total_used = 0;
            self.total_earned = 0;
            self.window_start = now;
            self.next_average_check = now.saturating_add_millis(AVERAGE_CHECK_INTERVAL_MILLIS);
            self.short_term_rate_per_tick = self.full_rate_per_tick();
            self.paused_until = None;
            return None;
        }

        if now >= self.next_report {
            self.report(now);
            self.next_report = now.saturating_add_millis(REPORT_INTERVAL_MILLIS);
        }

        if now < self.next_average_check {
            return None;
        }
        self.next_average_check = now.saturating_add_millis(AVERAGE_CHECK_INTERVAL_MILLIS);

        let elapsed = i64::try_from(now.millis_since(self.window_start)).unwrap_or(i64::MAX);
        self.total_earned = elapsed.saturating_mul(self.original_average_rate) / 1000;

        let verdict = self.verdict();
        let rate = match verdict {
            AverageVerdict::Underused => self.full_rate_per_tick(),
            AverageVerdict::Tolerated => self.short_term_rate_per_tick,
            AverageVerdict::Mild => self.original_short_term_rate / TICKS_PER_SECOND / 2,
            AverageVerdict::Moderate | AverageVerdict::Severe => self.average_rate_per_tick(),
        }
        .max(1);

        if rate != self.short_term_rate_per_tick {
            tracing::debug!(
                kind = %self.kind,
                ?verdict,
                from = self.short_term_rate_per_tick,
                to = rate,
                "short-term rate adjusted by long-term policy"
            );
        }
        self.short_term_rate_per_tick = rate;

        if verdict == AverageVerdict::Severe {
            tracing::warn!(
                kind = %self.kind,
                used = %format_bytes(self.total_used),
                earned = %format_bytes(self.total_earned),
                "severe long-term overuse, pausing for {}",
                format_duration(Duration::from_millis(FORCED_PAUSE_MILLIS))
            );
            self.paused_until = Some(now.saturating_add_millis(FORCED_PAUSE_MILLIS));
        }
        Some(verdict)
    }

    fn verdict(&self) -> AverageVerdict {
        let used = self.total_used;
        let earned = self.total_earned;
        if earned > used {
            AverageVerdict::Underused
        } else if used > earned.saturating_add(SEVERE_OVERUSE_BYTES) {
            AverageVerdict::Severe
        } else if used > earned.saturating_add(MODERATE_OVERUSE_BYTES) {
            AverageVerdict::Moderate
        } else if used > earned.saturating_add(MILD_OVERUSE_BYTES) {
            AverageVerdict::Mild
        } else {
            AverageVerdict::Tolerated
        }
    }

    fn report(&self, now: Timestamp) {
        tracing::info!(
            kind = %self.kind,
            used = %format_bytes(self.total_used),
            earned = %format_bytes(self.total_earned),
            window = %format_duration(Duration::from_millis(now.millis_since(self.window_start))),
            short_term = %format_rate(self.original_short_term_rate),
            average = %format_rate(self.original_average_rate),
            per_tick = self.short_term_rate_per_tick,
            "bandwidth usage report"
        );
    }

    /// Earliest time at which `shortfall` more bytes should have accrued.
    pub(crate) fn ready_at(&self, shortfall: i64, now: Timestamp) -> Timestamp {
        let per_tick = self.short_term_rate_per_tick.max(1);
        let ticks = u64::try_from((shortfall.max(1) + per_tick - 1) / per_tick).unwrap_or(u64::MAX);
        let first = self.next_refill.max(now);
        let ready = first.saturating_add_millis(ticks.saturating_sub(1).saturating_mul(TICK_MILLIS));
        match self.paused_until {
            Some(until) if until > ready => until,
            _ => ready,
        }
    }

    /// Take `bytes` out of the bucket and count them as used.
    pub(crate) fn debit(&mut self, bytes: i64) {
        self.available = self.available.saturating_sub(bytes);
        self.total_used = self.total_used.saturating_add(bytes);
    }

    /// Put `bytes` back and stop counting them as used.
    pub(crate) fn credit(&mut self, bytes: i64) {
        self.available = self.available.saturating_add(bytes);
        self.total_used = self.total_used.saturating_sub(bytes).max(0);
    }
}
