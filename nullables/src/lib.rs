//! Nullable infrastructure for deterministic testing.
//!
//! The limiter's external dependencies (time and the wrapped byte streams)
//! are abstracted behind traits. This crate provides test-friendly
//! implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Never actually sleep or touch the filesystem
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod stream;

pub use clock::NullClock;
pub use stream::NullStream;
