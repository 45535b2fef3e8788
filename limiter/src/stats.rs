//! Point-in-time view of a limiter's counters.

use bwlimit_types::LimiterKind;
use serde::Serialize;

/// Snapshot returned by [`BandwidthLimiter::stats`](crate::BandwidthLimiter::stats).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LimiterStats {
    pub kind: LimiterKind,
    /// Configured short-term ceiling, bytes per second.
    pub short_term_rate: i64,
    /// Configured long-term average, bytes per second.
    pub average_rate: i64,
    /// Bytes granted per tick right now, after any long-term adjustment.
    pub short_term_rate_per_tick: i64,
    pub ticks_per_second: i64,
    /// Bytes in the bucket. Negative after an abandoned blocking charge.
    pub available: i64,
    /// Bytes used in the current accounting window.
    pub total_used: i64,
    /// Bytes earned at the average rate as of the last long-term check.
    pub total_earned: i64,
    /// Age of the current accounting window.
    pub window_millis: u64,
    /// Whether a severe-overuse pause is in effect.
    pub paused: bool,
}

impl LimiterStats {
    /// Effective short-term rate in bytes per second.
    pub fn effective_rate(&self) -> i64 {
        self.short_term_rate_per_tick.saturating_mul(self.ticks_per_second)
    }
}
