//! In-memory adapter for the `Tracker` port.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::item::{Item, ItemClass, ItemId, ItemState};
use crate::ports::{ItemPage, ListRequest, Tracker, TrackerError, TrackerFuture};

/// A call received by a [`MemoryTracker`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "call")]
pub enum TrackerCall {
    /// `list_open_items`
    List {
        /// Listed class.
        class: ItemClass,
        /// Requested page.
        page: u32,
    },
    /// `add_label`
    AddLabel {
        /// Target item.
        id: ItemId,
        /// Label added.
        label: String,
    },
    /// `remove_label`
    RemoveLabel {
        /// Target item.
        id: ItemId,
        /// Label removed.
        label: String,
    },
    /// `post_comment`
    Comment {
        /// Target item.
        id: ItemId,
        /// Comment body.
        body: String,
    },
    /// `close_item`
    Close {
        /// Target item.
        id: ItemId,
    },
}

impl TrackerCall {
    /// Returns true for calls that change tracker state.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !matches!(self, TrackerCall::List { .. })
    }
}

#[derive(Debug)]
struct Stored {
    item: Item,
    label_added_at: HashMap<String, DateTime<Utc>>,
    comments: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    items: Vec<Stored>,
    calls: Vec<TrackerCall>,
    item_failures: HashMap<ItemId, VecDeque<TrackerError>>,
    list_failures: VecDeque<TrackerError>,
}

impl State {
    fn find(&mut self, id: &ItemId) -> Result<&mut Stored, TrackerError> {
        self.items
            .iter_mut()
            .find(|s| s.item.id == *id)
            .ok_or_else(|| TrackerError::NotFound(id.to_string()))
    }

    fn take_failure(&mut self, id: &ItemId) -> Option<TrackerError> {
        self.item_failures.get_mut(id).and_then(VecDeque::pop_front)
    }
}

/// A tracker held entirely in memory.
///
/// Mutations behave like a hosted tracker: each one bumps the item's
/// `last_activity_at` to the tracker's current time, and label application
/// times are remembered so listings report `marked_stale_at` for whichever
/// label the caller treats as the stale label. Failures can be queued per
/// item or for listings to exercise error handling.
pub struct MemoryTracker {
    state: Mutex<State>,
    now: Mutex<DateTime<Utc>>,
}

impl MemoryTracker {
    /// Creates a tracker holding `items`, stamping mutations with `now`.
    #[must_use]
    pub fn new(items: Vec<Item>, now: DateTime<Utc>) -> Self {
        let items = items
            .into_iter()
            .map(|item| Stored { item, label_added_at: HashMap::new(), comments: Vec::new() })
            .collect();
        Self {
            state: Mutex::new(State { items, ..State::default() }),
            now: Mutex::new(now),
        }
    }

    /// Loads a YAML list of items from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_fixture(path: &Path, now: DateTime<Utc>) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read fixture {}: {e}", path.display()))?;
        let items: Vec<Item> = serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse fixture {}: {e}", path.display()))?;
        Ok(Self::new(items, now))
    }

    /// Moves the tracker's clock, e.g. between two simulated runs.
    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock lock poisoned") = now;
    }

    /// Makes the next mutation on `id` fail with `error`. Calls queue up.
    pub fn fail_next(&self, id: &ItemId, error: TrackerError) {
        self.lock().item_failures.entry(id.clone()).or_default().push_back(error);
    }

    /// Makes the next listing call fail with `error`. Calls queue up.
    pub fn fail_next_listing(&self, error: TrackerError) {
        self.lock().list_failures.push_back(error);
    }

    /// Removes an item, as if deleted or transferred elsewhere.
    pub fn delete(&self, id: &ItemId) {
        self.lock().items.retain(|s| s.item.id != *id);
    }

    /// Records outside activity on an item at the tracker's current time.
    pub fn touch(&self, id: &ItemId) {
        let now = self.now();
        if let Ok(stored) = self.lock().find(id) {
            stored.item.last_activity_at = now;
        }
    }

    /// Returns the stored snapshot of an item.
    #[must_use]
    pub fn item(&self, id: &ItemId) -> Option<Item> {
        self.lock().items.iter().find(|s| s.item.id == *id).map(|s| s.item.clone())
    }

    /// Returns the comments posted on an item, oldest first.
    #[must_use]
    pub fn comments(&self, id: &ItemId) -> Vec<String> {
        self.lock().items.iter().find(|s| s.item.id == *id).map(|s| s.comments.clone()).unwrap_or_default()
    }

    /// Returns every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<TrackerCall> {
        self.lock().calls.clone()
    }

    /// Returns only the state-changing calls received so far.
    #[must_use]
    pub fn mutations(&self) -> Vec<TrackerCall> {
        self.lock().calls.iter().filter(|c| c.is_mutation()).cloned().collect()
    }

    /// Forgets recorded calls, keeping items.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock poisoned")
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("tracker lock poisoned")
    }

    fn list(&self, request: &ListRequest) -> Result<ItemPage, TrackerError> {
        let mut state = self.lock();
        state.calls.push(TrackerCall::List { class: request.class, page: request.page });
        if let Some(err) = state.list_failures.pop_front() {
            return Err(err);
        }

        let open: Vec<&Stored> = state
            .items
            .iter()
            .filter(|s| s.item.class == request.class && s.item.state == ItemState::Open)
            .collect();

        let per_page = usize::try_from(request.per_page.max(1)).unwrap_or(usize::MAX);
        let page_index = usize::try_from(request.page.saturating_sub(1)).unwrap_or(usize::MAX);
        let start = page_index.saturating_mul(per_page);

        let items = open
            .iter()
            .skip(start)
            .take(per_page)
            .map(|stored| {
                let mut item = stored.item.clone();
                item.marked_stale_at = if item.has_label(&request.stale_label) {
                    stored
                        .label_added_at
                        .get(&request.stale_label)
                        .copied()
                        .or(stored.item.marked_stale_at)
                } else {
                    None
                };
                item
            })
            .collect();

        let next_page = (start.saturating_add(per_page) < open.len()).then(|| request.page + 1);
        Ok(ItemPage { items, next_page })
    }

    fn mutate(
        &self,
        call: TrackerCall,
        id: &ItemId,
        change: impl FnOnce(&mut Stored, DateTime<Utc>),
    ) -> Result<(), TrackerError> {
        let now = self.now();
        let mut state = self.lock();
        state.calls.push(call);
        if let Some(err) = state.take_failure(id) {
            return Err(err);
        }
        let stored = state.find(id)?;
        change(stored, now);
        stored.item.last_activity_at = now;
        Ok(())
    }
}

impl Tracker for MemoryTracker {
    fn list_open_items<'a>(&'a self, request: &'a ListRequest) -> TrackerFuture<'a, ItemPage> {
        let result = self.list(request);
        Box::pin(async move { result })
    }

    fn add_label<'a>(&'a self, id: &'a ItemId, label: &'a str) -> TrackerFuture<'a, ()> {
        let call = TrackerCall::AddLabel { id: id.clone(), label: label.to_string() };
        let result = self.mutate(call, id, |stored, now| {
            if stored.item.labels.insert(label.to_string()) {
                stored.label_added_at.insert(label.to_string(), now);
            }
        });
        Box::pin(async move { result })
    }

    fn remove_label<'a>(&'a self, id: &'a ItemId, label: &'a str) -> TrackerFuture<'a, ()> {
        let call = TrackerCall::RemoveLabel { id: id.clone(), label: label.to_string() };
        let result = self.mutate(call, id, |stored, _| {
            if stored.item.labels.remove(label) {
                stored.label_added_at.remove(label);
                stored.item.marked_stale_at = None;
            }
        });
        Box::pin(async move { result })
    }

    fn post_comment<'a>(&'a self, id: &'a ItemId, body: &'a str) -> TrackerFuture<'a, ()> {
        let call = TrackerCall::Comment { id: id.clone(), body: body.to_string() };
        let result = self.mutate(call, id, |stored, _| stored.comments.push(body.to_string()));
        Box::pin(async move { result })
    }

    fn close_item<'a>(&'a self, id: &'a ItemId, _class: ItemClass) -> TrackerFuture<'a, ()> {
        let call = TrackerCall::Close { id: id.clone() };
        let result = self.mutate(call, id, |stored, _| stored.item.state = ItemState::Closed);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn issue(id: &str, labels: &[&str]) -> Item {
        Item {
            id: ItemId::new(id),
            class: ItemClass::Issue,
            labels: labels.iter().map(ToString::to_string).collect(),
            last_activity_at: now() - Duration::days(100),
            marked_stale_at: None,
            state: ItemState::Open,
        }
    }

    fn request(page: u32, per_page: u32) -> ListRequest {
        ListRequest { class: ItemClass::Issue, stale_label: "Stale".into(), page, per_page }
    }

    #[tokio::test]
    async fn lists_open_items_in_pages() {
        let closed = Item { state: ItemState::Closed, ..issue("3", &[]) };
        let pr = Item { class: ItemClass::PullRequest, ..issue("4", &[]) };
        let tracker =
            MemoryTracker::new(vec![issue("1", &[]), issue("2", &[]), closed, pr, issue("5", &[])], now());

        let first = tracker.list_open_items(&request(1, 2)).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_page, Some(2));

        let second = tracker.list_open_items(&request(2, 2)).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].id, ItemId::new("5"));
        assert_eq!(second.next_page, None);
    }

    #[tokio::test]
    async fn label_application_time_becomes_stale_marker() {
        let tracker = MemoryTracker::new(vec![issue("1", &[])], now());
        let id = ItemId::new("1");
        tracker.add_label(&id, "Stale").await.unwrap();

        let page = tracker.list_open_items(&request(1, 10)).await.unwrap();
        assert_eq!(page.items[0].marked_stale_at, Some(now()));
        assert_eq!(page.items[0].last_activity_at, now());

        tracker.remove_label(&id, "Stale").await.unwrap();
        let page = tracker.list_open_items(&request(1, 10)).await.unwrap();
        assert!(page.items[0].marked_stale_at.is_none());
    }

    #[tokio::test]
    async fn seeded_marker_only_reported_with_label() {
        let seeded = Item { marked_stale_at: Some(now() - Duration::days(3)), ..issue("1", &["Stale"]) };
        let unlabeled = Item { marked_stale_at: Some(now()), ..issue("2", &[]) };
        let tracker = MemoryTracker::new(vec![seeded, unlabeled], now());

        let page = tracker.list_open_items(&request(1, 10)).await.unwrap();
        assert_eq!(page.items[0].marked_stale_at, Some(now() - Duration::days(3)));
        assert!(page.items[1].marked_stale_at.is_none());
    }

    #[tokio::test]
    async fn queued_failures_fire_once() {
        let tracker = MemoryTracker::new(vec![issue("1", &[])], now());
        let id = ItemId::new("1");
        tracker.fail_next(&id, TrackerError::Transient("503".into()));

        assert!(tracker.post_comment(&id, "hi").await.is_err());
        assert!(tracker.post_comment(&id, "hi").await.is_ok());
        assert_eq!(tracker.comments(&id), vec!["hi".to_string()]);
        assert_eq!(tracker.mutations().len(), 2);
    }

    #[tokio::test]
    async fn missing_item_is_not_found() {
        let tracker = MemoryTracker::new(vec![issue("1", &[])], now());
        let id = ItemId::new("1");
        tracker.delete(&id);
        let err = tracker.close_item(&id, ItemClass::Issue).await.unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));
    }

    #[tokio::test]
    async fn close_hides_item_from_listing() {
        let tracker = MemoryTracker::new(vec![issue("1", &[])], now());
        tracker.close_item(&ItemId::new("1"), ItemClass::Issue).await.unwrap();
        let page = tracker.list_open_items(&request(1, 10)).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(tracker.item(&ItemId::new("1")).unwrap().state, ItemState::Closed);
    }
}
