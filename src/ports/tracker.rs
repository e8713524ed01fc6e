//! Issue tracker port: the list and mutate calls a sweep needs.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::item::{Item, ItemClass, ItemId};

/// Boxed future type alias used by [`Tracker`] to keep the trait dyn-compatible.
pub type TrackerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TrackerError>> + Send + 'a>>;

/// Failure of a single tracker call, classified by how a sweep reacts to it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// Network failure, rate limit, or server error. The item is retried next run.
    #[error("transient tracker error: {0}")]
    Transient(String),
    /// Credentials missing or refused. Aborts the run.
    #[error("tracker authorization failed: {0}")]
    Authorization(String),
    /// The item no longer exists.
    #[error("item not found: {0}")]
    NotFound(String),
    /// The tracker refused the request for this item and will keep refusing it.
    #[error("tracker rejected request ({status}): {message}")]
    Rejected {
        /// HTTP-style status code.
        status: u16,
        /// Message returned by the tracker.
        message: String,
    },
}

impl TrackerError {
    /// Returns true when the error invalidates every further call in the run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, TrackerError::Authorization(_))
    }
}

/// One page request for open items of a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequest {
    /// Class of items to list.
    pub class: ItemClass,
    /// Label whose application time fills [`Item::marked_stale_at`].
    pub stale_label: String,
    /// 1-based page number.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
}

/// One page of open items.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemPage {
    /// Items on this page.
    pub items: Vec<Item>,
    /// Page to request next, or `None` when the listing is exhausted.
    pub next_page: Option<u32>,
}

/// Lists and mutates items in an external tracker.
///
/// Listing is paginated so a sweep pulls pages lazily and stops fetching once
/// its operation budget is spent. Every mutation is idempotent on the tracker
/// side: adding a present label or removing an absent one is harmless.
pub trait Tracker: Send + Sync {
    /// Lists one page of open items.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be fetched.
    fn list_open_items<'a>(&'a self, request: &'a ListRequest) -> TrackerFuture<'a, ItemPage>;

    /// Adds `label` to the item.
    ///
    /// # Errors
    ///
    /// Returns an error if the label cannot be added.
    fn add_label<'a>(&'a self, id: &'a ItemId, label: &'a str) -> TrackerFuture<'a, ()>;

    /// Removes `label` from the item.
    ///
    /// # Errors
    ///
    /// Returns an error if the label cannot be removed.
    fn remove_label<'a>(&'a self, id: &'a ItemId, label: &'a str) -> TrackerFuture<'a, ()>;

    /// Posts a comment on the item.
    ///
    /// # Errors
    ///
    /// Returns an error if the comment cannot be posted.
    fn post_comment<'a>(&'a self, id: &'a ItemId, body: &'a str) -> TrackerFuture<'a, ()>;

    /// Closes the item.
    ///
    /// # Errors
    ///
    /// Returns an error if the item cannot be closed.
    fn close_item<'a>(&'a self, id: &'a ItemId, class: ItemClass) -> TrackerFuture<'a, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_authorization_is_fatal() {
        assert!(TrackerError::Authorization("bad token".into()).is_fatal());
        assert!(!TrackerError::Transient("timeout".into()).is_fatal());
        assert!(!TrackerError::NotFound("#3".into()).is_fatal());
        assert!(!TrackerError::Rejected { status: 422, message: "nope".into() }.is_fatal());
    }
}
