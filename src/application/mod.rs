//! Application layer - orchestration of the domain logic.
//!
//! - Rate limiter over a bounded store, with its background sweeper
//! - Named quota windows
//! - Request pipeline and its error taxonomy
//!
//! ## Ports
//!
//! The traits in [`ports`] are what this layer needs from the outside: a clock,
//! a store, and the content cache, fetcher and summarizer collaborators.

pub mod limiter;
pub mod metrics;
pub mod pipeline;
pub mod ports;
pub mod quota;
pub mod sweeper;
