//! Service context bundling the port trait objects a sweep runs against.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::adapters::live::{GitHubTracker, LiveClock};
use crate::adapters::memory::{FixedClock, MemoryTracker};
use crate::ports::clock::Clock;
use crate::ports::tracker::Tracker;

/// Environment variable holding the GitHub token.
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Bundles all port trait objects into a single context.
///
/// Constructors wire up different adapter implementations: live GitHub and
/// wall time, or an in-memory tracker seeded from a fixture file.
pub struct ServiceContext {
    /// Clock for obtaining the current time.
    pub clock: Box<dyn Clock>,
    /// Issue tracker being swept.
    pub tracker: Box<dyn Tracker>,
}

impl ServiceContext {
    /// Creates a live context against a GitHub repository.
    ///
    /// The token is read from `GITHUB_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is missing or the tracker cannot be built.
    pub fn live(api_url: &str, repository: &str) -> Result<Self, String> {
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| format!("{TOKEN_ENV} environment variable not set"))?;
        let tracker = GitHubTracker::new(api_url, repository, &token)?;
        Ok(Self { clock: Box::new(LiveClock), tracker: Box::new(tracker) })
    }

    /// Creates an offline context from a YAML item fixture.
    ///
    /// With `now`, both the clock and the tracker are frozen at that instant;
    /// without it, wall time is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the fixture cannot be read or parsed.
    pub fn fixture(path: &Path, now: Option<DateTime<Utc>>) -> Result<Self, String> {
        let now = now.unwrap_or_else(Utc::now);
        let tracker = MemoryTracker::from_fixture(path, now)?;
        Ok(Self { clock: Box::new(FixedClock::new(now)), tracker: Box::new(tracker) })
    }
}
