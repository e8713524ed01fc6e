//! Tracked items as seen by the sweeper.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, stable identifier of a tracked item.
///
/// For GitHub this is the issue or pull request number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Creates an identifier from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The two item classes, each with its own policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemClass {
    /// An issue.
    Issue,
    /// A pull request.
    PullRequest,
}

impl ItemClass {
    /// Both classes, in the order a sweep visits them.
    pub const ALL: [ItemClass; 2] = [ItemClass::Issue, ItemClass::PullRequest];
}

impl fmt::Display for ItemClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemClass::Issue => f.pad("issue"),
            ItemClass::PullRequest => f.pad("pr"),
        }
    }
}

/// Open/closed state reported by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Still open.
    #[default]
    Open,
    /// Closed. The sweeper never reopens an item.
    Closed,
}

/// A snapshot of one issue or pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Stable identifier.
    pub id: ItemId,
    /// Issue or pull request.
    pub class: ItemClass,
    /// Labels currently on the item.
    #[serde(default)]
    pub labels: BTreeSet<String>,
    /// Last update of any kind (comment, commit, label change).
    pub last_activity_at: DateTime<Utc>,
    /// When the stale label was applied, if it is present.
    #[serde(default)]
    pub marked_stale_at: Option<DateTime<Utc>>,
    /// Open or closed.
    #[serde(default)]
    pub state: ItemState,
}

impl Item {
    /// Returns true when the item carries `label`.
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Returns true when any of the item's labels is in `labels`.
    #[must_use]
    pub fn has_any_label(&self, labels: &BTreeSet<String>) -> bool {
        !self.labels.is_disjoint(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(labels: &[&str]) -> Item {
        Item {
            id: ItemId::new("7"),
            class: ItemClass::Issue,
            labels: labels.iter().map(ToString::to_string).collect(),
            last_activity_at: Utc::now(),
            marked_stale_at: None,
            state: ItemState::Open,
        }
    }

    #[test]
    fn label_queries() {
        let item = item(&["type: bug", "status: blocked"]);
        assert!(item.has_label("type: bug"));
        assert!(!item.has_label("pending closure"));

        let exempt: BTreeSet<String> = ["status: blocked".to_string()].into();
        assert!(item.has_any_label(&exempt));
        assert!(!item.has_any_label(&BTreeSet::new()));
    }

    #[test]
    fn deserializes_with_defaults() {
        let yaml = "id: '42'\nclass: pull_request\nlast_activity_at: 2024-01-01T00:00:00Z\n";
        let item: Item = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(item.id, ItemId::new("42"));
        assert_eq!(item.class, ItemClass::PullRequest);
        assert_eq!(item.state, ItemState::Open);
        assert!(item.labels.is_empty());
        assert!(item.marked_stale_at.is_none());
    }

    #[test]
    fn display_forms() {
        assert_eq!(ItemId::new("12").to_string(), "#12");
        assert_eq!(ItemClass::PullRequest.to_string(), "pr");
    }
}
