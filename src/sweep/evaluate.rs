//! Pure staleness decisions.
//!
//! [`evaluate`] maps an item snapshot, its class policy, and the run's
//! instant to a [`Decision`]; [`plan_mutations`] turns that decision into the
//! tracker calls that carry it out. Nothing here touches the tracker, so the
//! same snapshot always yields the same plan.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::item::{Item, ItemState};
use crate::policy::{Policy, SweepOptions};

/// Why an item needs no mutation this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Already closed.
    Closed,
    /// Carries an exempt label.
    Exempt,
    /// Active recently enough.
    Fresh,
    /// The class never goes stale.
    StaleDisabled,
    /// Stale, but not for long enough to close.
    AwaitingClose,
    /// Stale, and the class never closes.
    CloseDisabled,
}

/// Why a stale label is being removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnstaleReason {
    /// The item saw activity after it was marked stale.
    Updated,
    /// The item gained an exempt label while stale.
    Exempt,
}

/// Outcome of evaluating one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "reason")]
pub enum Decision {
    /// Leave the item alone.
    Skip(SkipReason),
    /// Apply the stale label.
    MarkStale,
    /// Remove the stale label.
    Unstale(UnstaleReason),
    /// Close the item.
    Close,
}

/// A single mutating tracker call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "value")]
pub enum Mutation {
    /// Add a label.
    AddLabel(String),
    /// Remove a label.
    RemoveLabel(String),
    /// Post a comment.
    Comment(String),
    /// Close the item.
    Close,
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::AddLabel(label) => write!(f, "add label {label:?}"),
            Mutation::RemoveLabel(label) => write!(f, "remove label {label:?}"),
            Mutation::Comment(body) => {
                let first_line = body.lines().next().unwrap_or_default();
                write!(f, "comment {first_line:?}")
            }
            Mutation::Close => f.write_str("close"),
        }
    }
}

/// Decides what a sweep should do with `item` at instant `now`.
#[must_use]
pub fn evaluate(item: &Item, policy: &Policy, options: &SweepOptions, now: DateTime<Utc>) -> Decision {
    if item.state != ItemState::Open {
        return Decision::Skip(SkipReason::Closed);
    }

    let is_stale = item.has_label(&policy.stale_label);

    if item.has_any_label(&policy.exempt_labels) {
        if is_stale && options.remove_stale_when_exempt {
            return Decision::Unstale(UnstaleReason::Exempt);
        }
        return Decision::Skip(SkipReason::Exempt);
    }

    if !is_stale {
        if !policy.days_before_stale.is_enabled() {
            return Decision::Skip(SkipReason::StaleDisabled);
        }
        if policy.days_before_stale.is_reached(item.last_activity_at, now) {
            return Decision::MarkStale;
        }
        return Decision::Skip(SkipReason::Fresh);
    }

    // A label applied by hand may have no recorded timestamp.
    let marked_stale_at = item.marked_stale_at.unwrap_or(item.last_activity_at);

    if options.remove_stale_when_updated
        && item.last_activity_at > marked_stale_at + options.activity_grace
    {
        return Decision::Unstale(UnstaleReason::Updated);
    }

    if !policy.days_before_close.is_enabled() {
        return Decision::Skip(SkipReason::CloseDisabled);
    }
    if policy.days_before_close.is_reached(marked_stale_at, now) {
        return Decision::Close;
    }
    Decision::Skip(SkipReason::AwaitingClose)
}

/// Lists the tracker calls that carry out `decision`, in the order to issue them.
#[must_use]
pub fn plan_mutations(decision: Decision, policy: &Policy) -> Vec<Mutation> {
    match decision {
        Decision::Skip(_) => Vec::new(),
        Decision::MarkStale => {
            let mut mutations = vec![Mutation::AddLabel(policy.stale_label.clone())];
            if let Some(message) = &policy.stale_message {
                mutations.push(Mutation::Comment(message.clone()));
            }
            mutations
        }
        Decision::Unstale(_) => vec![Mutation::RemoveLabel(policy.stale_label.clone())],
        Decision::Close => {
            let mut mutations = Vec::with_capacity(3);
            if let Some(message) = &policy.close_message {
                mutations.push(Mutation::Comment(message.clone()));
            }
            if let Some(label) = &policy.close_label {
                mutations.push(Mutation::AddLabel(label.clone()));
            }
            mutations.push(Mutation::Close);
            mutations
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Duration;

    use super::*;
    use crate::item::{ItemClass, ItemId};
    use crate::policy::Threshold;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn policy() -> Policy {
        Policy {
            days_before_stale: Threshold::Days(90),
            days_before_close: Threshold::Days(30),
            exempt_labels: ["status: accepted".to_string(), "status: blocked".to_string()].into(),
            stale_label: "pending closure".to_string(),
            stale_message: Some("marked stale".to_string()),
            close_message: Some("closed for inactivity".to_string()),
            close_label: None,
        }
    }

    fn item(idle_days: i64, labels: &[&str]) -> Item {
        Item {
            id: ItemId::new("1"),
            class: ItemClass::Issue,
            labels: labels.iter().map(ToString::to_string).collect::<BTreeSet<_>>(),
            last_activity_at: now() - Duration::days(idle_days),
            marked_stale_at: None,
            state: ItemState::Open,
        }
    }

    fn stale_item(staled_days_ago: i64, active_days_ago: i64) -> Item {
        Item {
            marked_stale_at: Some(now() - Duration::days(staled_days_ago)),
            ..item(active_days_ago, &["pending closure"])
        }
    }

    #[test]
    fn inactive_item_is_marked_stale() {
        let decision = evaluate(&item(91, &[]), &policy(), &SweepOptions::default(), now());
        assert_eq!(decision, Decision::MarkStale);
        assert_eq!(
            plan_mutations(decision, &policy()),
            vec![
                Mutation::AddLabel("pending closure".to_string()),
                Mutation::Comment("marked stale".to_string()),
            ]
        );
    }

    #[test]
    fn recent_item_is_fresh() {
        let decision = evaluate(&item(89, &[]), &policy(), &SweepOptions::default(), now());
        assert_eq!(decision, Decision::Skip(SkipReason::Fresh));
        assert!(plan_mutations(decision, &policy()).is_empty());
    }

    #[test]
    fn closed_item_is_skipped() {
        let closed = Item { state: ItemState::Closed, ..item(400, &[]) };
        assert_eq!(
            evaluate(&closed, &policy(), &SweepOptions::default(), now()),
            Decision::Skip(SkipReason::Closed)
        );
    }

    #[test]
    fn exempt_item_is_never_staled_or_closed() {
        let options = SweepOptions::default();
        let old = item(1000, &["status: blocked"]);
        assert_eq!(evaluate(&old, &policy(), &options, now()), Decision::Skip(SkipReason::Exempt));

        let mut stale = stale_item(365, 365);
        stale.labels.insert("status: accepted".to_string());
        assert_eq!(evaluate(&stale, &policy(), &options, now()), Decision::Skip(SkipReason::Exempt));
    }

    #[test]
    fn exempt_stale_item_loses_label_when_enabled() {
        let options = SweepOptions { remove_stale_when_exempt: true, ..SweepOptions::default() };
        let mut stale = stale_item(5, 5);
        stale.labels.insert("status: accepted".to_string());
        let decision = evaluate(&stale, &policy(), &options, now());
        assert_eq!(decision, Decision::Unstale(UnstaleReason::Exempt));
        assert_eq!(
            plan_mutations(decision, &policy()),
            vec![Mutation::RemoveLabel("pending closure".to_string())]
        );
    }

    #[test]
    fn long_stale_item_is_closed() {
        let decision = evaluate(&stale_item(31, 31), &policy(), &SweepOptions::default(), now());
        assert_eq!(decision, Decision::Close);
        assert_eq!(
            plan_mutations(decision, &policy()),
            vec![Mutation::Comment("closed for inactivity".to_string()), Mutation::Close]
        );
    }

    #[test]
    fn close_age_counts_from_marker_not_activity() {
        let item = stale_item(10, 400);
        assert_eq!(
            evaluate(&item, &policy(), &SweepOptions::default(), now()),
            Decision::Skip(SkipReason::AwaitingClose)
        );
    }

    #[test]
    fn activity_after_marker_keeps_label_by_default() {
        let decision = evaluate(&stale_item(31, 2), &policy(), &SweepOptions::default(), now());
        assert_eq!(decision, Decision::Close);
    }

    #[test]
    fn activity_after_marker_unstales_when_enabled() {
        let options = SweepOptions { remove_stale_when_updated: true, ..SweepOptions::default() };
        let decision = evaluate(&stale_item(10, 2), &policy(), &options, now());
        assert_eq!(decision, Decision::Unstale(UnstaleReason::Updated));
    }

    #[test]
    fn own_label_and_comment_are_not_renewed_activity() {
        let options = SweepOptions { remove_stale_when_updated: true, ..SweepOptions::default() };
        let marked = now() - Duration::days(3);
        let item = Item {
            marked_stale_at: Some(marked),
            last_activity_at: marked + Duration::seconds(2),
            ..item(0, &["pending closure"])
        };
        assert_eq!(
            evaluate(&item, &policy(), &options, now()),
            Decision::Skip(SkipReason::AwaitingClose)
        );
    }

    #[test]
    fn missing_marker_falls_back_to_last_activity() {
        let item = item(45, &["pending closure"]);
        assert_eq!(evaluate(&item, &policy(), &SweepOptions::default(), now()), Decision::Close);
    }

    #[test]
    fn disabled_thresholds_skip() {
        let policy = Policy {
            days_before_stale: Threshold::Disabled,
            days_before_close: Threshold::Disabled,
            ..policy()
        };
        let options = SweepOptions::default();
        assert_eq!(
            evaluate(&item(1000, &[]), &policy, &options, now()),
            Decision::Skip(SkipReason::StaleDisabled)
        );
        assert_eq!(
            evaluate(&stale_item(1000, 1000), &policy, &options, now()),
            Decision::Skip(SkipReason::CloseDisabled)
        );
    }

    #[test]
    fn close_plan_includes_close_label_and_omits_blank_message() {
        let policy = Policy {
            close_message: None,
            close_label: Some("closed: stale".to_string()),
            ..policy()
        };
        assert_eq!(
            plan_mutations(Decision::Close, &policy),
            vec![Mutation::AddLabel("closed: stale".to_string()), Mutation::Close]
        );
    }

    #[test]
    fn mutation_display_uses_first_comment_line() {
        let mutation = Mutation::Comment("first\nsecond".to_string());
        assert_eq!(mutation.to_string(), "comment \"first\"");
        assert_eq!(Mutation::Close.to_string(), "close");
    }
}
