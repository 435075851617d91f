//! Test doubles for the ports and for log capture.

pub mod clock;
pub mod collaborators;
pub mod layer;

pub use clock::MockClock;
pub use collaborators::{MockCache, MockFetcher, MockSummarizer};
pub use layer::{CapturedEvent, MockCaptureLayer};
