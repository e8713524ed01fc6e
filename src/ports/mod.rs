//! Port traits defining external boundaries.
//!
//! The sweeper talks to the outside world through two ports: time and the
//! issue tracker. Implementations live in `src/adapters/`.

pub mod clock;
pub mod tracker;

pub use clock::Clock;
pub use tracker::{ItemPage, ListRequest, Tracker, TrackerError, TrackerFuture};
