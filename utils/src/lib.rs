//! Shared utilities for bwlimit.

pub mod logging;
pub mod time;
pub mod units;

pub use logging::{init_logging, LogFormat};
pub use time::format_duration;
pub use units::{format_bytes, format_rate};
