//! In-memory adapters for tests and offline fixture runs.

pub mod clock;
pub mod tracker;

pub use clock::FixedClock;
pub use tracker::{MemoryTracker, TrackerCall};
