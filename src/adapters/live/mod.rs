//! Live adapters for real external interactions.

pub mod clock;
pub mod github;

pub use clock::LiveClock;
pub use github::GitHubTracker;
