//! Fetch orchestration for live pages and stored snapshots.
//!
//! Both batches are "settle all": every (event, role) request is started
//! up front, awaited together, and its outcome kept independently. One slow
//! or broken host never cancels or fails its siblings.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use drift_store::{PageRole, SnapshotKey, SnapshotStore};
use futures::future::join_all;
use reqwest::header::ACCEPT_LANGUAGE;
use tracing::debug;

use crate::catalog::TrackedEvent;
use crate::error::{DriftError, FetchError, Result};
use crate::obs;

/// Language preference sent with main-page requests.
pub const MAIN_PAGE_LANGUAGE: &str = "en-US,en;q=0.9,de;q=0.8";

/// Default per-request timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default size above which a page is treated as a failed fetch.
pub const MAX_PAGE_BYTES: usize = 8 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of one live fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The page body
    Fetched(String),
    /// The fetch failed; the role contributes no data this run
    Failed(String),
    /// The event has no URL for this role
    NotApplicable,
}

impl FetchOutcome {
    pub fn html(&self) -> Option<&str> {
        match self {
            FetchOutcome::Fetched(html) => Some(html),
            _ => None,
        }
    }
}

/// Live content of both pages of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPages {
    pub main: FetchOutcome,
    pub important_dates: FetchOutcome,
}

impl Default for EventPages {
    fn default() -> Self {
        EventPages {
            main: FetchOutcome::NotApplicable,
            important_dates: FetchOutcome::NotApplicable,
        }
    }
}

impl EventPages {
    pub fn get(&self, role: PageRole) -> &FetchOutcome {
        match role {
            PageRole::Main => &self.main,
            PageRole::ImportantDates => &self.important_dates,
        }
    }

    fn set(&mut self, role: PageRole, outcome: FetchOutcome) {
        match role {
            PageRole::Main => self.main = outcome,
            PageRole::ImportantDates => self.important_dates = outcome,
        }
    }
}

/// Stored snapshots of both pages of one event. `None` means no usable
/// snapshot (never stored, or the read failed).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorPages {
    pub main: Option<String>,
    pub important_dates: Option<String>,
}

impl PriorPages {
    pub fn get(&self, role: PageRole) -> Option<&str> {
        match role {
            PageRole::Main => self.main.as_deref(),
            PageRole::ImportantDates => self.important_dates.as_deref(),
        }
    }

    fn set(&mut self, role: PageRole, html: Option<String>) {
        match role {
            PageRole::Main => self.main = html,
            PageRole::ImportantDates => self.important_dates = html,
        }
    }
}

// ---------------------------------------------------------------------------
// PageFetcher
// ---------------------------------------------------------------------------

/// Retrieves the live HTML of a page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, role: PageRole) -> std::result::Result<String, FetchError>;
}

/// Settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub user_agent: String,
    /// Largest accepted body; reading stops as soon as it is exceeded
    pub max_bytes: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            timeout: DEFAULT_FETCH_TIMEOUT,
            user_agent: format!("pl-conf-drift/{}", env!("CARGO_PKG_VERSION")),
            max_bytes: MAX_PAGE_BYTES,
        }
    }
}

/// `reqwest`-backed fetcher shared by every request of a run.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent)
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| DriftError::HttpClient(e.to_string()))?;
        Ok(HttpFetcher {
            client,
            max_bytes: settings.max_bytes,
        })
    }
}

fn too_large(url: &str, bytes: u64, limit: usize) -> FetchError {
    FetchError::Body {
        url: url.to_string(),
        reason: format!("{bytes} bytes exceeds the {limit} byte limit"),
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

fn body_error(url: &str, err: reqwest::Error) -> FetchError {
    match transport_error(url, err) {
        FetchError::Transport { url, reason } => FetchError::Body { url, reason },
        other => other,
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, role: PageRole) -> std::result::Result<String, FetchError> {
        let mut request = self.client.get(url);
        if role == PageRole::Main {
            request = request.header(ACCEPT_LANGUAGE, MAIN_PAGE_LANGUAGE);
        }

        let mut response = request.send().await.map_err(|e| transport_error(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(declared) = response.content_length() {
            if declared > self.max_bytes as u64 {
                return Err(too_large(url, declared, self.max_bytes));
            }
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| body_error(url, e))? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(too_large(
                    url,
                    (body.len() + chunk.len()) as u64,
                    self.max_bytes,
                ));
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url, bytes = body.len(), "page fetched");
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// Fetch both pages of every given event concurrently.
///
/// Every event appears in the result; roles without a URL are
/// `NotApplicable` and failures are `Failed`.
pub async fn fetch_current<'a, I>(
    fetcher: &dyn PageFetcher,
    events: I,
) -> BTreeMap<String, EventPages>
where
    I: IntoIterator<Item = &'a TrackedEvent>,
{
    let requests = events.into_iter().flat_map(move |event| {
        PageRole::ALL.into_iter().map(move |role| async move {
            let outcome = match event.page_url(role) {
                None => FetchOutcome::NotApplicable,
                Some(url) => match fetcher.fetch(url, role).await {
                    Ok(html) => FetchOutcome::Fetched(html),
                    Err(err) => {
                        obs::emit_fetch_failed(&event.abbreviation, role, &err);
                        FetchOutcome::Failed(err.to_string())
                    }
                },
            };
            (event.abbreviation.clone(), role, outcome)
        })
    });

    let mut pages: BTreeMap<String, EventPages> = BTreeMap::new();
    for (id, role, outcome) in join_all(requests).await {
        pages.entry(id).or_default().set(role, outcome);
    }
    pages
}

/// Read the stored snapshots of both pages of every given event
/// concurrently. Read failures degrade to "no snapshot" for that page only.
pub async fn load_prior<'a, I>(
    store: &dyn SnapshotStore,
    event_ids: I,
) -> BTreeMap<String, PriorPages>
where
    I: IntoIterator<Item = &'a str>,
{
    let reads = event_ids.into_iter().flat_map(move |id| {
        PageRole::ALL.into_iter().map(move |role| async move {
            let key = SnapshotKey::new(id, role);
            let html = match store.get(&key).await {
                Ok(html) => html,
                Err(err) => {
                    obs::emit_snapshot_read_failed(&key, &err);
                    None
                }
            };
            (key, html)
        })
    });

    let mut prior: BTreeMap<String, PriorPages> = BTreeMap::new();
    for (key, html) in join_all(reads).await {
        prior.entry(key.event_id).or_default().set(key.role, html);
    }
    prior
}
