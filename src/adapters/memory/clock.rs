//! Fixed clock for deterministic sweeps.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::ports::clock::Clock;

/// Clock that reports a set instant until moved.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock stopped at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock lock poisoned") = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn fixed_clock_serves_set_time() {
        let start = DateTime::parse_from_rfc3339("2024-06-15T10:30:00Z").unwrap().with_timezone(&Utc);
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start);

        clock.set(start + Duration::days(1));
        assert_eq!(clock.now().to_rfc3339(), "2024-06-16T10:30:00+00:00");
    }
}
