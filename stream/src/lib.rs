//! Throttled byte streams.
//!
//! [`ThrottledReader`] and [`ThrottledWriter`] wrap any [`std::io::Read`] /
//! [`std::io::Write`] and clear every transferred byte against a shared
//! [`BandwidthLimiter`](bwlimit_limiter::BandwidthLimiter), blocking the
//! calling thread while budget is short. [`AsyncThrottledReader`] and
//! [`AsyncThrottledWriter`] do the same for tokio streams using only the
//! limiter's non-blocking path.
//!
//! Errors from the wrapped stream pass through untouched; throttling only
//! ever makes a transfer slower.

pub mod async_io;
pub mod reader;
pub mod throttle;
pub mod writer;

pub use async_io::{AsyncThrottledReader, AsyncThrottledWriter};
pub use reader::ThrottledReader;
pub use throttle::STARTUP_RESERVATION;
pub use writer::ThrottledWriter;
