//! Domain layer - pure perimeter logic with no I/O.
//!
//! - URL normalization and validation
//! - Lexical SSRF host classification
//! - Counting-window arithmetic on a single rate-limit record
//!
//! Nothing in this layer suspends, allocates shared state, or reads the clock.

pub mod host;
pub mod url;
pub mod window;
