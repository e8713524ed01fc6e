//! Per-class staleness policies and run-wide sweep options.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::item::ItemClass;

/// An age threshold in whole days, or disabled.
///
/// Configured as an integer; any negative value disables the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "i64")]
pub enum Threshold {
    /// The transition never fires.
    Disabled,
    /// The transition fires once this many days have elapsed.
    Days(u32),
}

impl Threshold {
    /// Returns false for [`Threshold::Disabled`].
    #[must_use]
    pub fn is_enabled(self) -> bool {
        matches!(self, Threshold::Days(_))
    }

    /// Returns true when at least the threshold has elapsed from `since` to `now`.
    ///
    /// A disabled threshold is never reached.
    #[must_use]
    pub fn is_reached(self, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Threshold::Disabled => false,
            Threshold::Days(days) => now - since >= Duration::days(i64::from(days)),
        }
    }
}

impl From<i64> for Threshold {
    fn from(days: i64) -> Self {
        if days < 0 {
            Threshold::Disabled
        } else {
            Threshold::Days(u32::try_from(days).unwrap_or(u32::MAX))
        }
    }
}

impl From<Threshold> for i64 {
    fn from(threshold: Threshold) -> Self {
        match threshold {
            Threshold::Disabled => -1,
            Threshold::Days(days) => i64::from(days),
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Disabled => f.write_str("disabled"),
            Threshold::Days(1) => f.write_str("1 day"),
            Threshold::Days(days) => write!(f, "{days} days"),
        }
    }
}

/// How one item class is aged, labeled, and closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Policy {
    /// Inactivity before the stale label is applied.
    pub days_before_stale: Threshold,
    /// Time spent stale (from `marked_stale_at`) before closing.
    pub days_before_close: Threshold,
    /// Any of these labels exempts an item from evaluation.
    pub exempt_labels: BTreeSet<String>,
    /// Label marking an item stale.
    pub stale_label: String,
    /// Comment posted when the item is marked stale.
    pub stale_message: Option<String>,
    /// Comment posted when the item is closed.
    pub close_message: Option<String>,
    /// Label added when the item is closed.
    pub close_label: Option<String>,
}

impl Policy {
    /// Mutating calls needed by the costliest transition this policy allows.
    #[must_use]
    pub fn largest_transition(&self) -> u32 {
        let mark = if self.days_before_stale.is_enabled() {
            1 + u32::from(self.stale_message.is_some())
        } else {
            0
        };
        let close = if self.days_before_close.is_enabled() {
            1 + u32::from(self.close_message.is_some()) + u32::from(self.close_label.is_some())
        } else {
            0
        };
        // Unstaling is a single label removal.
        mark.max(close).max(1)
    }
}

/// Policies for both item classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Policies {
    /// Policy for issues.
    pub issue: Policy,
    /// Policy for pull requests.
    pub pull_request: Policy,
}

impl Policies {
    /// Returns the policy governing `class`.
    #[must_use]
    pub fn for_class(&self, class: ItemClass) -> &Policy {
        match class {
            ItemClass::Issue => &self.issue,
            ItemClass::PullRequest => &self.pull_request,
        }
    }
}

/// Options that apply to a whole run regardless of item class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOptions {
    /// Hard cap on mutating tracker calls per run.
    pub operations_per_run: u32,
    /// Renewed activity on a stale item removes its stale label.
    pub remove_stale_when_updated: bool,
    /// Exempt items that still carry the stale label have it removed.
    pub remove_stale_when_exempt: bool,
    /// Activity this close to `marked_stale_at` is the sweeper's own doing.
    pub activity_grace: Duration,
    /// Plan and report mutations without issuing them.
    pub dry_run: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            operations_per_run: 30,
            remove_stale_when_updated: false,
            remove_stale_when_exempt: false,
            activity_grace: Duration::seconds(60),
            dry_run: false,
        }
    }
}
