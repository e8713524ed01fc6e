//! What a sweep did, for logs and the operator.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::evaluate::{Decision, Mutation, SkipReason};
use crate::item::{ItemClass, ItemId};
use crate::ports::TrackerError;

/// How a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// The daily scheduled run.
    Schedule,
    /// An on-demand run.
    Manual,
}

/// Per-class counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ClassTally {
    /// Open items looked at.
    pub examined: u32,
    /// Items skipped for an exempt label.
    pub exempt: u32,
    /// Items newly labeled stale.
    pub marked_stale: u32,
    /// Items whose stale label was removed.
    pub unstaled: u32,
    /// Items closed.
    pub closed: u32,
    /// Items that disappeared mid-run.
    pub vanished: u32,
    /// Items whose transition failed.
    pub failed: u32,
}

impl ClassTally {
    fn record(&mut self, decision: Decision) {
        match decision {
            Decision::Skip(SkipReason::Exempt) => self.exempt += 1,
            Decision::Skip(_) => {}
            Decision::MarkStale => self.marked_stale += 1,
            Decision::Unstale(_) => self.unstaled += 1,
            Decision::Close => self.closed += 1,
        }
    }
}

/// A mutation issued (or, in a dry run, planned) against an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMutation {
    /// Target item.
    pub item: ItemId,
    /// Its class.
    pub class: ItemClass,
    /// The call.
    pub mutation: Mutation,
}

/// A per-item failure left for the next run to retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// Item whose transition failed, or `None` when listing itself failed.
    pub item: Option<ItemId>,
    /// Its class.
    pub class: ItemClass,
    /// Rendered error.
    pub error: String,
}

/// Summary of one sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Unique id of this run, for correlating log lines.
    pub run_id: Uuid,
    /// How the run was started.
    pub trigger: Trigger,
    /// The instant items were aged against.
    pub now: DateTime<Utc>,
    /// Whether mutations were only planned.
    pub dry_run: bool,
    /// Issue counters.
    pub issues: ClassTally,
    /// Pull request counters.
    pub pull_requests: ClassTally,
    /// Mutating calls spent.
    pub operations_used: u32,
    /// The run stopped early because the budget ran out.
    pub budget_exhausted: bool,
    /// Every mutation in issue order.
    pub mutations: Vec<AppliedMutation>,
    /// Per-item failures.
    pub failures: Vec<ItemFailure>,
}

impl SweepReport {
    /// Creates an empty report for a run starting at `now`.
    #[must_use]
    pub fn new(trigger: Trigger, now: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            trigger,
            now,
            dry_run,
            issues: ClassTally::default(),
            pull_requests: ClassTally::default(),
            operations_used: 0,
            budget_exhausted: false,
            mutations: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Returns the counters for `class`.
    #[must_use]
    pub fn tally(&self, class: ItemClass) -> &ClassTally {
        match class {
            ItemClass::Issue => &self.issues,
            ItemClass::PullRequest => &self.pull_requests,
        }
    }

    pub(crate) fn tally_mut(&mut self, class: ItemClass) -> &mut ClassTally {
        match class {
            ItemClass::Issue => &mut self.issues,
            ItemClass::PullRequest => &mut self.pull_requests,
        }
    }

    pub(crate) fn record_decision(&mut self, class: ItemClass, decision: Decision) {
        self.tally_mut(class).record(decision);
    }

    pub(crate) fn record_mutation(&mut self, item: &ItemId, class: ItemClass, mutation: Mutation) {
        self.mutations.push(AppliedMutation { item: item.clone(), class, mutation });
    }

    pub(crate) fn record_failure(&mut self, item: Option<&ItemId>, class: ItemClass, error: &TrackerError) {
        if item.is_some() {
            self.tally_mut(class).failed += 1;
        }
        self.failures.push(ItemFailure { item: item.cloned(), class, error: error.to_string() });
    }

    /// Formats the report for a terminal.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mode = if self.dry_run { " (dry run)" } else { "" };
        let _ = writeln!(out, "Sweep {} [{:?}]{mode} at {}", self.run_id, self.trigger, self.now.to_rfc3339());

        for class in ItemClass::ALL {
            let t = self.tally(class);
            let _ = writeln!(
                out,
                "  {class:<6} examined {}, exempt {}, marked stale {}, unstaled {}, closed {}, vanished {}, failed {}",
                t.examined, t.exempt, t.marked_stale, t.unstaled, t.closed, t.vanished, t.failed
            );
        }

        let _ = write!(out, "  operations used: {}", self.operations_used);
        if self.budget_exhausted {
            out.push_str(" (budget exhausted, remaining items deferred)");
        }
        out.push('\n');

        for applied in &self.mutations {
            let _ = writeln!(out, "  {} {}: {}", applied.class, applied.item, applied.mutation);
        }
        for failure in &self.failures {
            match &failure.item {
                Some(item) => {
                    let _ = writeln!(out, "  FAILED {} {item}: {}", failure.class, failure.error);
                }
                None => {
                    let _ = writeln!(out, "  FAILED listing {}: {}", failure.class, failure.error);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> SweepReport {
        SweepReport::new(Trigger::Schedule, Utc::now(), false)
    }

    #[test]
    fn tallies_decisions_per_class() {
        let mut report = report();
        report.record_decision(ItemClass::Issue, Decision::MarkStale);
        report.record_decision(ItemClass::Issue, Decision::Skip(SkipReason::Exempt));
        report.record_decision(ItemClass::Issue, Decision::Skip(SkipReason::Fresh));
        report.record_decision(ItemClass::PullRequest, Decision::Close);

        assert_eq!(report.issues.marked_stale, 1);
        assert_eq!(report.issues.exempt, 1);
        assert_eq!(report.pull_requests.closed, 1);
        assert_eq!(report.pull_requests.marked_stale, 0);
    }

    #[test]
    fn listing_failures_do_not_count_as_item_failures() {
        let mut report = report();
        let err = TrackerError::Transient("502".into());
        report.record_failure(None, ItemClass::Issue, &err);
        report.record_failure(Some(&ItemId::new("4")), ItemClass::Issue, &err);
        assert_eq!(report.issues.failed, 1);
        assert_eq!(report.failures.len(), 2);
    }

    #[test]
    fn render_lists_mutations_and_failures() {
        let mut report = report();
        report.operations_used = 2;
        report.budget_exhausted = true;
        report.record_mutation(&ItemId::new("9"), ItemClass::Issue, Mutation::Close);
        report.record_failure(
            Some(&ItemId::new("10")),
            ItemClass::PullRequest,
            &TrackerError::Transient("timeout".into()),
        );

        let out = report.render();
        assert!(out.contains("operations used: 2 (budget exhausted"));
        assert!(out.contains("issue #9: close"));
        assert!(out.contains("FAILED pr #10: transient tracker error: timeout"));
    }
}
