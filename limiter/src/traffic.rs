//! One limiter per traffic class.

use std::sync::Arc;

use bwlimit_types::{Clock, LimiterKind, SystemClock};

use crate::{BandwidthLimiter, ThrottleConfig};

/// The limiters a process hands to its streams: one for what it sends and
/// one for what it receives. With a shared budget both handles point at the
/// same [`LimiterKind::Both`] limiter.
#[derive(Clone, Debug)]
pub struct TrafficLimiters {
    pub sent: Arc<BandwidthLimiter>,
    pub received: Arc<BandwidthLimiter>,
}

impl TrafficLimiters {
    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: &ThrottleConfig, clock: Arc<dyn Clock>) -> Self {
        if config.share_budget {
            let both = Arc::new(BandwidthLimiter::with_clock(
                config.upload.short_term_bytes_per_sec,
                config.upload.average_bytes_per_sec,
                LimiterKind::Both,
                clock,
            ));
            return Self {
                sent: both.clone(),
                received: both,
            };
        }

        let sent = BandwidthLimiter::with_clock(
            config.upload.short_term_bytes_per_sec,
            config.upload.average_bytes_per_sec,
            LimiterKind::Sent,
            clock.clone(),
        );
        let received = BandwidthLimiter::with_clock(
            config.download.short_term_bytes_per_sec,
            config.download.average_bytes_per_sec,
            LimiterKind::Received,
            clock,
        );
        Self {
            sent: Arc::new(sent),
            received: Arc::new(received),
        }
    }

    pub fn is_shared(&self) -> bool {
        Arc::ptr_eq(&self.sent, &self.received)
    }
}
