//! Budgeted execution of staleness decisions against a tracker.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::evaluate::{evaluate, plan_mutations, Mutation};
use super::report::{SweepReport, Trigger};
use crate::item::{Item, ItemClass, ItemId};
use crate::policy::{Policies, Policy, SweepOptions};
use crate::ports::{Clock, ListRequest, Tracker, TrackerError};

/// Items requested per listing page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// A run-level failure.
#[derive(Debug, Error)]
pub enum SweepError {
    /// A fatal tracker error stopped the run. Mutations already issued stand.
    #[error("sweep aborted after {} operations: {source}", .report.operations_used)]
    Aborted {
        /// The error that stopped the run.
        source: TrackerError,
        /// Everything the run did before stopping.
        report: Box<SweepReport>,
    },
}

/// Remaining and spent mutating calls for one run.
#[derive(Debug, Clone, Copy)]
struct Budget {
    remaining: u32,
    used: u32,
}

impl Budget {
    fn new(limit: u32) -> Self {
        Self { remaining: limit, used: 0 }
    }

    fn is_exhausted(self) -> bool {
        self.remaining == 0
    }

    fn can_afford(self, operations: usize) -> bool {
        usize::try_from(self.remaining).map_or(true, |remaining| operations <= remaining)
    }

    fn spend(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        self.used += 1;
    }
}

/// Whether the scan goes on after an item.
enum Flow {
    Continue,
    OutOfBudget,
}

/// Marks inactive items stale and closes items that stayed stale.
///
/// One call to [`StaleSweeper::sweep`] is one run: every open item of both
/// classes is listed up front and evaluated once against a single instant, and at most
/// `operations_per_run` mutating calls are issued. The sweeper keeps no state
/// between runs; whatever a run leaves undone is picked up by the next.
pub struct StaleSweeper<'a> {
    tracker: &'a dyn Tracker,
    clock: &'a dyn Clock,
    policies: &'a Policies,
    options: &'a SweepOptions,
    page_size: u32,
}

impl<'a> StaleSweeper<'a> {
    /// Creates a sweeper over the given ports and configuration.
    #[must_use]
    pub fn new(
        tracker: &'a dyn Tracker,
        clock: &'a dyn Clock,
        policies: &'a Policies,
        options: &'a SweepOptions,
    ) -> Self {
        Self { tracker, clock, policies, options, page_size: DEFAULT_PAGE_SIZE }
    }

    /// Overrides the listing page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Runs one sweep.
    ///
    /// Per-item failures are recorded in the report and do not stop the run.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::Aborted`] when the tracker refuses authorization;
    /// the error carries the partial report.
    pub async fn sweep(&self, trigger: Trigger) -> Result<SweepReport, SweepError> {
        let now = self.clock.now();
        let mut report = SweepReport::new(trigger, now, self.options.dry_run);
        let mut budget = Budget::new(self.options.operations_per_run);

        info!(
            run_id = %report.run_id,
            ?trigger,
            budget = self.options.operations_per_run,
            dry_run = self.options.dry_run,
            "starting sweep"
        );

        'classes: for class in ItemClass::ALL {
            let policy = self.policies.for_class(class);

            // With no budget left, one page is enough to tell whether anything is deferred.
            let items = match self.list_class(class, policy, budget.is_exhausted()).await {
                Ok(items) => items,
                Err(err) if err.is_fatal() => {
                    report.record_failure(None, class, &err);
                    return Err(abort(err, report, budget));
                }
                Err(err) => {
                    warn!(%class, error = %err, "listing failed, skipping class this run");
                    report.record_failure(None, class, &err);
                    continue;
                }
            };

            for item in &items {
                if budget.is_exhausted() {
                    report.budget_exhausted = true;
                    break 'classes;
                }
                match self.process(item, class, policy, now, &mut budget, &mut report).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::OutOfBudget) => {
                        report.budget_exhausted = true;
                        break 'classes;
                    }
                    Err(err) => return Err(abort(err, report, budget)),
                }
            }
        }

        report.operations_used = budget.used;
        info!(
            run_id = %report.run_id,
            operations = report.operations_used,
            budget_exhausted = report.budget_exhausted,
            failures = report.failures.len(),
            "sweep finished"
        );
        Ok(report)
    }

    /// Lists every open item of `class` before any of them is mutated.
    ///
    /// Closing an item or bumping its activity reorders the tracker's
    /// listing, so paging while mutating would skip items. With
    /// `first_page_only` the scan stops after one page.
    async fn list_class(
        &self,
        class: ItemClass,
        policy: &Policy,
        first_page_only: bool,
    ) -> Result<Vec<Item>, TrackerError> {
        let mut items = Vec::new();
        let mut next_page = Some(1);

        while let Some(page) = next_page {
            let request = ListRequest {
                class,
                stale_label: policy.stale_label.clone(),
                page,
                per_page: self.page_size,
            };
            let listing = self.tracker.list_open_items(&request).await?;
            items.extend(listing.items);
            next_page = listing.next_page.filter(|_| !first_page_only);
        }

        debug!(%class, items = items.len(), "listed open items");
        Ok(items)
    }

    /// Evaluates one item and issues its mutations.
    ///
    /// Returns `Err` only for fatal tracker errors.
    async fn process(
        &self,
        item: &Item,
        class: ItemClass,
        policy: &Policy,
        now: DateTime<Utc>,
        budget: &mut Budget,
        report: &mut SweepReport,
    ) -> Result<Flow, TrackerError> {
        let decision = evaluate(item, policy, self.options, now);
        let mutations = plan_mutations(decision, policy);

        if mutations.is_empty() {
            debug!(item = %item.id, %class, ?decision, "no change");
            report.tally_mut(class).examined += 1;
            report.record_decision(class, decision);
            return Ok(Flow::Continue);
        }

        // A transition is issued whole or deferred whole.
        if !budget.can_afford(mutations.len()) {
            debug!(item = %item.id, %class, needed = mutations.len(), remaining = budget.remaining, "deferred");
            return Ok(Flow::OutOfBudget);
        }
        report.tally_mut(class).examined += 1;

        for mutation in mutations {
            budget.spend();
            if !self.options.dry_run {
                if let Err(err) = self.apply(&item.id, class, &mutation).await {
                    if err.is_fatal() {
                        report.record_failure(Some(&item.id), class, &err);
                        return Err(err);
                    }
                    if let TrackerError::NotFound(_) = err {
                        info!(item = %item.id, %class, "item vanished mid-run");
                        report.tally_mut(class).vanished += 1;
                    } else {
                        warn!(item = %item.id, %class, %mutation, error = %err, "mutation failed, retrying next run");
                        report.record_failure(Some(&item.id), class, &err);
                    }
                    return Ok(Flow::Continue);
                }
            }
            report.record_mutation(&item.id, class, mutation);
        }

        info!(item = %item.id, %class, ?decision, remaining = budget.remaining, "transitioned");
        report.record_decision(class, decision);
        Ok(Flow::Continue)
    }

    async fn apply(&self, id: &ItemId, class: ItemClass, mutation: &Mutation) -> Result<(), TrackerError> {
        match mutation {
            Mutation::AddLabel(label) => self.tracker.add_label(id, label).await,
            Mutation::RemoveLabel(label) => self.tracker.remove_label(id, label).await,
            Mutation::Comment(body) => self.tracker.post_comment(id, body).await,
            Mutation::Close => self.tracker.close_item(id, class).await,
        }
    }
}

fn abort(source: TrackerError, mut report: SweepReport, budget: Budget) -> SweepError {
    report.operations_used = budget.used;
    error!(run_id = %report.run_id, error = %source, operations = budget.used, "sweep aborted");
    SweepError::Aborted { source, report: Box::new(report) }
}
