//! Shared bandwidth limiting.
//!
//! A [`BandwidthLimiter`] arbitrates one byte budget among any number of
//! threads. Budget refills in fixed ticks ([`TICKS_PER_SECOND`] per second)
//! up to a short-term ceiling; an optional long-term average, checked on a
//! much slower cadence over a rolling week, scales the short-term grant down
//! when sustained usage runs ahead of it.
//!
//! Consumers either block ([`BandwidthLimiter::charge`],
//! [`BandwidthLimiter::reserve`]) or poll
//! ([`BandwidthLimiter::charge_non_blocking`]) and back off on the returned
//! [`BandwidthToken`].

pub mod config;
pub mod error;
pub mod limiter;
pub mod state;
pub mod stats;
pub mod token;
pub mod traffic;

pub use config::{LimiterConfig, ThrottleConfig};
pub use error::ConfigError;
pub use limiter::{BandwidthLimiter, MAX_SINGLE_SLEEP_MILLIS, MAX_TOTAL_WAIT_MILLIS};
pub use state::{TICKS_PER_SECOND, TICK_MILLIS};
pub use stats::LimiterStats;
pub use token::BandwidthToken;
pub use traffic::TrafficLimiters;
