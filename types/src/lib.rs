//! Fundamental types for bwlimit.
//!
//! This crate defines the types shared across every other crate in the
//! workspace: monotonic timestamps, the clock abstraction the limiter reads
//! time through, and the traffic-class label.

pub mod clock;
pub mod kind;
pub mod time;

pub use clock::{Clock, SystemClock};
pub use kind::LimiterKind;
pub use time::Timestamp;
