//! Live adapter for the `Tracker` port using the GitHub REST API.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::item::{Item, ItemClass, ItemId, ItemState};
use crate::ports::{ItemPage, ListRequest, Tracker, TrackerError, TrackerFuture};

const API_VERSION: &str = "2022-11-28";
const EVENTS_PER_PAGE: u32 = 100;

/// Tracker backed by a GitHub repository's issues and pull requests.
pub struct GitHubTracker {
    client: Client,
    api_url: Url,
    owner: String,
    name: String,
    token: String,
}

/// Issue or pull request as returned by the issues endpoint.
#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
    state: String,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    labels: Vec<GhLabel>,
    /// Present only on pull requests.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

/// Entry of an issue's event timeline.
#[derive(Debug, Deserialize)]
struct GhEvent {
    event: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    label: Option<GhLabel>,
}

#[derive(Debug, Deserialize)]
struct GhError {
    message: String,
}

#[derive(Serialize)]
struct LabelsBody<'a> {
    labels: [&'a str; 1],
}

#[derive(Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

impl GhIssue {
    fn class(&self) -> ItemClass {
        if self.pull_request.is_some() {
            ItemClass::PullRequest
        } else {
            ItemClass::Issue
        }
    }

    fn into_item(self) -> Item {
        let class = self.class();
        Item {
            id: ItemId::new(self.number.to_string()),
            class,
            labels: self.labels.into_iter().map(|l| l.name).collect(),
            last_activity_at: self.updated_at,
            marked_stale_at: None,
            state: if self.state == "closed" { ItemState::Closed } else { ItemState::Open },
        }
    }
}

/// Returns the time `label` was last applied, according to `events`.
fn last_labeled_at(events: &[GhEvent], label: &str) -> Option<DateTime<Utc>> {
    events
        .iter()
        .filter(|e| e.event == "labeled" && e.label.as_ref().is_some_and(|l| l.name == label))
        .map(|e| e.created_at)
        .max()
}

/// Keeps a failed label-history lookup from failing the whole page.
///
/// Without a timestamp the sweep falls back to the item's last activity,
/// which can only postpone a close. Authorization failures still propagate.
fn stale_marker(
    id: &ItemId,
    lookup: Result<Option<DateTime<Utc>>, TrackerError>,
) -> Result<Option<DateTime<Utc>>, TrackerError> {
    match lookup {
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            warn!(item = %id, error = %err, "stale label history unavailable, using last activity");
            Ok(None)
        }
        found => found,
    }
}

/// Maps a failed response to the error kind a sweep reacts to.
fn classify(status: StatusCode, headers: &HeaderMap, body: &str) -> TrackerError {
    let message = serde_json::from_str::<GhError>(body).map_or_else(|_| body.to_string(), |e| e.message);
    let rate_limited = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "0")
        || message.to_ascii_lowercase().contains("rate limit");

    match status {
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS if rate_limited => {
            TrackerError::Transient(format!("rate limited: {message}"))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TrackerError::Authorization(message),
        StatusCode::NOT_FOUND | StatusCode::GONE => TrackerError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => TrackerError::Transient(message),
        s if s.is_server_error() => TrackerError::Transient(format!("{}: {message}", s.as_u16())),
        s => TrackerError::Rejected { status: s.as_u16(), message },
    }
}

impl GitHubTracker {
    /// Creates a tracker for `repository` (`owner/name`) at `api_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or the repository is not
    /// of the form `owner/name`.
    pub fn new(api_url: &str, repository: &str, token: &str) -> Result<Self, String> {
        let api_url = Url::parse(api_url).map_err(|e| format!("Invalid API URL {api_url:?}: {e}"))?;
        if api_url.cannot_be_a_base() {
            return Err(format!("Invalid API URL {api_url}: not a base URL"));
        }
        let (owner, name) = repository
            .split_once('/')
            .filter(|(o, n)| !o.is_empty() && !n.is_empty() && !n.contains('/'))
            .ok_or_else(|| format!("Invalid repository {repository:?}: expected owner/name"))?;

        Ok(Self {
            client: Client::new(),
            api_url,
            owner: owner.to_string(),
            name: name.to_string(),
            token: token.to_string(),
        })
    }

    /// Builds `<api>/repos/<owner>/<name>/<segments...>` with each segment escaped.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["repos", self.owner.as_str(), self.name.as_str()]).extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!("sweeper/", env!("CARGO_PKG_VERSION")))
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TrackerError> {
        let response = request
            .send()
            .await
            .map_err(|e| TrackerError::Transient(format!("GitHub request failed: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, &headers, &body))
    }

    async fn fetch_json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T, TrackerError> {
        let response = self.send(self.request(Method::GET, url)).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| TrackerError::Transient(format!("Failed to parse GitHub response: {e}")))
    }

    async fn labeled_at(&self, number: &str, label: &str) -> Result<Option<DateTime<Utc>>, TrackerError> {
        let mut latest = None;
        let mut page = 1u32;
        loop {
            let mut url = self.url(&["issues", number, "events"]);
            url.query_pairs_mut()
                .append_pair("per_page", &EVENTS_PER_PAGE.to_string())
                .append_pair("page", &page.to_string());
            let events: Vec<GhEvent> = self.fetch_json(url).await?;
            latest = latest.max(last_labeled_at(&events, label));
            if events.len() < EVENTS_PER_PAGE as usize {
                return Ok(latest);
            }
            page += 1;
        }
    }

    async fn list(&self, request: &ListRequest) -> Result<ItemPage, TrackerError> {
        let mut url = self.url(&["issues"]);
        url.query_pairs_mut()
            .append_pair("state", "open")
            .append_pair("sort", "updated")
            .append_pair("direction", "asc")
            .append_pair("per_page", &request.per_page.to_string())
            .append_pair("page", &request.page.to_string());

        let raw: Vec<GhIssue> = self.fetch_json(url).await?;
        let next_page = (raw.len() >= request.per_page as usize).then(|| request.page + 1);

        let mut items = Vec::new();
        for issue in raw.into_iter().filter(|i| i.class() == request.class) {
            let mut item = issue.into_item();
            if item.has_label(&request.stale_label) {
                let lookup = self.labeled_at(item.id.as_str(), &request.stale_label).await;
                item.marked_stale_at = stale_marker(&item.id, lookup)?;
            }
            items.push(item);
        }
        debug!(class = %request.class, page = request.page, items = items.len(), "listed GitHub items");
        Ok(ItemPage { items, next_page })
    }

    async fn add_label_to(&self, id: &ItemId, label: &str) -> Result<(), TrackerError> {
        let url = self.url(&["issues", id.as_str(), "labels"]);
        self.send(self.request(Method::POST, url).json(&LabelsBody { labels: [label] })).await?;
        Ok(())
    }

    async fn remove_label_from(&self, id: &ItemId, label: &str) -> Result<(), TrackerError> {
        let url = self.url(&["issues", id.as_str(), "labels", label]);
        match self.send(self.request(Method::DELETE, url)).await {
            // Label already gone; the goal is met either way.
            Ok(_) | Err(TrackerError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn comment_on(&self, id: &ItemId, body: &str) -> Result<(), TrackerError> {
        let url = self.url(&["issues", id.as_str(), "comments"]);
        self.send(self.request(Method::POST, url).json(&CommentBody { body })).await?;
        Ok(())
    }

    async fn close(&self, id: &ItemId, class: ItemClass) -> Result<(), TrackerError> {
        let url = self.url(&["issues", id.as_str()]);
        let body = match class {
            ItemClass::Issue => json!({ "state": "closed", "state_reason": "not_planned" }),
            ItemClass::PullRequest => json!({ "state": "closed" }),
        };
        self.send(self.request(Method::PATCH, url).json(&body)).await?;
        Ok(())
    }
}

impl Tracker for GitHubTracker {
    fn list_open_items<'a>(&'a self, request: &'a ListRequest) -> TrackerFuture<'a, ItemPage> {
        Box::pin(self.list(request))
    }

    fn add_label<'a>(&'a self, id: &'a ItemId, label: &'a str) -> TrackerFuture<'a, ()> {
        Box::pin(self.add_label_to(id, label))
    }

    fn remove_label<'a>(&'a self, id: &'a ItemId, label: &'a str) -> TrackerFuture<'a, ()> {
        Box::pin(self.remove_label_from(id, label))
    }

    fn post_comment<'a>(&'a self, id: &'a ItemId, body: &'a str) -> TrackerFuture<'a, ()> {
        Box::pin(self.comment_on(id, body))
    }

    fn close_item<'a>(&'a self, id: &'a ItemId, class: ItemClass) -> TrackerFuture<'a, ()> {
        Box::pin(self.close(id, class))
    }
}
