//! Limiter binding shared by all stream decorators.
//!
//! A stream created against a limited budget first reserves
//! [`STARTUP_RESERVATION`] bytes. When budget is scarce this slows down the
//! creation of new streams as well as their transfers. The reservation goes
//! back to the pool after the stream's first successful transfer, when the
//! limiter is swapped, or when the stream is dropped.

use std::sync::Arc;

use bwlimit_limiter::BandwidthLimiter;

/// Bytes a new stream reserves before its first transfer.
pub const STARTUP_RESERVATION: i64 = 10_000;

/// Reserved budget handed back to its limiter on drop.
#[derive(Debug)]
struct Reservation {
    limiter: Arc<BandwidthLimiter>,
    bytes: i64,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        tracing::trace!(kind = %self.limiter.kind(), bytes = self.bytes, "returning startup reservation");
        self.limiter.release(self.bytes);
    }
}

#[derive(Debug)]
pub(crate) struct Throttle {
    limiter: Option<Arc<BandwidthLimiter>>,
    disabled: bool,
    reservation: Option<Reservation>,
}

impl Throttle {
    pub(crate) fn new(disabled: bool) -> Self {
        Self {
            limiter: None,
            disabled,
            reservation: None,
        }
    }

    /// Bind to `limiter` and take the startup reservation, blocking as needed.
    pub(crate) fn with_limiter(disabled: bool, limiter: Arc<BandwidthLimiter>) -> Self {
        let mut throttle = Self::new(disabled);
        throttle.limiter = Some(limiter);
        let reserved = throttle
            .active()
            .map(|limiter| limiter.reserve(STARTUP_RESERVATION));
        if let Some(bytes) = reserved {
            throttle.hold(bytes);
        }
        throttle
    }

    /// Bind to `limiter` and take whatever startup reservation is available
    /// right now.
    pub(crate) fn with_limiter_non_blocking(disabled: bool, limiter: Arc<BandwidthLimiter>) -> Self {
        let mut throttle = Self::new(disabled);
        throttle.limiter = Some(limiter);
        let reserved = throttle
            .active()
            .map(|limiter| limiter.charge_non_blocking(STARTUP_RESERVATION).granted_now());
        if let Some(bytes) = reserved {
            throttle.hold(bytes);
        }
        throttle
    }

    fn hold(&mut self, bytes: i64) {
        if let (Some(limiter), true) = (&self.limiter, bytes > 0) {
            self.reservation = Some(Reservation {
                limiter: limiter.clone(),
                bytes,
            });
        }
    }

    /// The limiter to draw from, or `None` when every transfer should pass
    /// straight through.
    pub(crate) fn active(&self) -> Option<&Arc<BandwidthLimiter>> {
        if self.disabled {
            return None;
        }
        self.limiter.as_ref().filter(|limiter| !limiter.is_unlimited())
    }

    pub(crate) fn limiter(&self) -> Option<&Arc<BandwidthLimiter>> {
        self.limiter.as_ref()
    }

    pub(crate) fn set_limiter(&mut self, limiter: Arc<BandwidthLimiter>) {
        self.reservation = None;
        self.limiter = Some(limiter);
    }

    pub(crate) fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub(crate) fn reserved(&self) -> i64 {
        self.reservation.as_ref().map_or(0, |r| r.bytes)
    }

    /// Called after a successful transfer: the reservation has done its job.
    pub(crate) fn settle(&mut self) {
        self.reservation = None;
    }
}

/// Largest single budget request a stream makes: one second of the
/// limiter's short-term rate.
pub(crate) fn chunk_limit(limiter: &BandwidthLimiter) -> usize {
    usize::try_from(limiter.short_term_rate().max(1)).unwrap_or(usize::MAX)
}

pub(crate) fn to_bytes(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

pub(crate) fn to_len(bytes: i64) -> usize {
    usize::try_from(bytes).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bwlimit_nullables::NullClock;
    use bwlimit_types::LimiterKind;

    fn limiter(rate: i64) -> Arc<BandwidthLimiter> {
        Arc::new(BandwidthLimiter::with_clock(
            rate,
            0,
            LimiterKind::Sent,
            Arc::new(NullClock::new(0)),
        ))
    }

    #[test]
    fn reservation_taken_and_returned_on_drop() {
        let limiter = limiter(100_000);
        let throttle = Throttle::with_limiter(false, limiter.clone());
        assert_eq!(throttle.reserved(), STARTUP_RESERVATION);
        assert_eq!(limiter.stats().total_used, STARTUP_RESERVATION);

        drop(throttle);
        let stats = limiter.stats();
        assert_eq!(stats.total_used, 0);
        assert_eq!(stats.available, 10_000);
    }

    #[test]
    fn no_reservation_when_disabled_or_unlimited() {
        let limited = limiter(100_000);
        let disabled = Throttle::with_limiter(true, limited.clone());
        assert_eq!(disabled.reserved(), 0);
        assert!(disabled.active().is_none());
        assert_eq!(limited.stats().total_used, 0);

        let unlimited = Throttle::with_limiter(false, limiter(0));
        assert_eq!(unlimited.reserved(), 0);
        assert!(unlimited.active().is_none());
    }

    #[test]
    fn swapping_limiter_returns_reservation() {
        let first = limiter(100_000);
        let second = limiter(100_000);
        let mut throttle = Throttle::with_limiter(false, first.clone());
        throttle.set_limiter(second.clone());
        assert_eq!(throttle.reserved(), 0);
        assert_eq!(first.stats().total_used, 0);
        assert!(Arc::ptr_eq(throttle.limiter().unwrap(), &second));
    }

    #[test]
    fn non_blocking_reservation_takes_what_is_there() {
        let limiter = limiter(1_000);
        let throttle = Throttle::with_limiter_non_blocking(false, limiter.clone());
        // One 100 byte tick is all a fresh 1000 B/s bucket holds.
        assert_eq!(throttle.reserved(), 100);
    }

    #[test]
    fn conversions_saturate() {
        assert_eq!(to_len(-5), 0);
        assert_eq!(to_len(12), 12);
        assert_eq!(to_bytes(7), 7);
    }
}
