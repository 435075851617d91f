//! Infrastructure layer - adapters for the application ports.
//!
//! - Clock (system time)
//! - Bounded FIFO storage
//! - In-memory content cache
//! - DNS re-validation
//! - TOML configuration

pub mod cache;
pub mod clock;
pub mod config;
pub mod resolve;
pub mod storage;

/// Mock implementations for testing.
///
/// Available in test builds, or downstream with the `test-helpers` feature:
/// ```toml
/// [dev-dependencies]
/// fetch-perimeter = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
