//! Result of a non-blocking bandwidth request.

use bwlimit_types::Timestamp;

/// What [`BandwidthLimiter::charge_non_blocking`](crate::BandwidthLimiter::charge_non_blocking)
/// granted, and when to come back for the rest.
///
/// The granted bytes are already debited from the limiter when the token is
/// handed out. A caller that ends up not using them should
/// [`release`](crate::BandwidthLimiter::release) the difference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandwidthToken {
    granted_now: i64,
    sleep_until: Option<Timestamp>,
}

impl BandwidthToken {
    pub(crate) fn new(granted_now: i64, sleep_until: Option<Timestamp>) -> Self {
        Self {
            granted_now,
            sleep_until,
        }
    }

    pub(crate) fn full(granted_now: i64) -> Self {
        Self::new(granted_now, None)
    }

    /// Bytes that may be transferred right now. Never more than requested.
    pub fn granted_now(&self) -> i64 {
        self.granted_now
    }

    /// When more budget is expected, on the limiter's clock. `None` means
    /// the request was satisfied and no wait is needed.
    pub fn sleep_until(&self) -> Option<Timestamp> {
        self.sleep_until
    }

    pub fn is_complete(&self) -> bool {
        self.sleep_until.is_none()
    }
}
