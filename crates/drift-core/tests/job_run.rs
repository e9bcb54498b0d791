//! End-to-end runs of the drift job over in-memory collaborators.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use drift_core::{
    DriftJob, EventCatalog, FetchError, JobSettings, MaybeDate, MemoryNotifier, PageFetcher,
    PageRole, SegmentTag, SnapshotStore, TrackedEvent,
};
use drift_store::fakes::{FaultyStore, MemorySnapshotStore};
use drift_store::{SnapshotKey, StoreError, StoreResult};
use tokio::sync::watch;

/// Serves pages from a mutable URL map; unknown URLs fail with a 503.
#[derive(Default)]
struct StubWeb {
    pages: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<(String, PageRole)>>,
}

impl StubWeb {
    fn serve(&self, url: &str, html: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), html.to_string());
    }

    fn requested(&self) -> Vec<(String, PageRole)> {
        let mut r = self.requests.lock().unwrap().clone();
        r.sort_by(|a, b| a.0.cmp(&b.0));
        r
    }
}

#[async_trait]
impl PageFetcher for StubWeb {
    async fn fetch(&self, url: &str, role: PageRole) -> Result<String, FetchError> {
        self.requests.lock().unwrap().push((url.to_string(), role));
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 503,
            })
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 17, 0, 0).unwrap()
}

fn settings() -> JobSettings {
    JobSettings {
        from: "drift@example.org".to_string(),
        to: "ops@example.org".to_string(),
        dry_run: false,
    }
}

fn job(
    store: Arc<dyn SnapshotStore>,
    web: Arc<StubWeb>,
    notifier: Arc<MemoryNotifier>,
) -> DriftJob {
    DriftJob::new(store, web, notifier, settings())
}

#[tokio::test]
async fn changed_deadline_is_reported_and_persisted() {
    let store = Arc::new(
        MemorySnapshotStore::new().with_snapshot("e", PageRole::Main, "Deadline: Jan 1"),
    );
    let web = Arc::new(StubWeb::default());
    web.serve("https://e.test/", "Deadline: Feb 1");
    let notifier = Arc::new(MemoryNotifier::new());
    let catalog =
        EventCatalog::from_events(vec![TrackedEvent::new("e").with_url("https://e.test/")])
            .unwrap();

    let outcome = job(store.clone(), web, notifier.clone())
        .run(&catalog, now())
        .await
        .unwrap();

    let drift = outcome.report.events[0].main.as_ref().unwrap();
    assert!(drift.has_changes);
    let removed: Vec<_> = drift.changes().filter(|s| s.tag == SegmentTag::Removed).collect();
    let added: Vec<_> = drift.changes().filter(|s| s.tag == SegmentTag::Added).collect();
    assert_eq!(removed.len(), 1);
    assert_eq!(added.len(), 1);
    assert!(removed[0].text.contains("Jan"));
    assert!(added[0].text.contains("Feb"));

    assert_eq!(outcome.events_changed, 1);
    assert!(outcome.notified);
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ops@example.org");
    assert_eq!(sent[0].subject, "Drift Report for Fri Oct 16 2026");
    assert!(sent[0].html_body.contains("E (main page)"));

    assert_eq!(
        store.snapshot("e", PageRole::Main).as_deref(),
        Some("Deadline: Feb 1")
    );
    assert_eq!(outcome.snapshots_written, 1);
}

#[tokio::test]
async fn failed_fetch_without_snapshot_contributes_nothing() {
    let store = Arc::new(MemorySnapshotStore::new());
    let web = Arc::new(StubWeb::default());
    let notifier = Arc::new(MemoryNotifier::new());
    let catalog = EventCatalog::from_events(vec![TrackedEvent::new("f")
        .with_url("https://f.test/")
        .with_important_date_url("https://f.test/dates")])
    .unwrap();

    let outcome = job(store.clone(), web, notifier.clone())
        .run(&catalog, now())
        .await
        .unwrap();

    assert_eq!(outcome.fetch_failures, 2);
    assert_eq!(outcome.events_changed, 0);
    assert_eq!(outcome.report.events[0].main, None);
    assert_eq!(outcome.report.events[0].important_dates, None);
    assert!(store.writes().is_empty());
    assert!(notifier.sent()[0]
        .html_body
        .contains("No changes detected in any monitored events"));
}

#[tokio::test]
async fn failed_fetch_keeps_last_known_snapshot() {
    let store = Arc::new(
        MemorySnapshotStore::new().with_snapshot("f", PageRole::Main, "<p>long history</p>"),
    );
    let web = Arc::new(StubWeb::default());
    let catalog =
        EventCatalog::from_events(vec![TrackedEvent::new("f").with_url("https://f.test/")])
            .unwrap();

    let outcome = job(store.clone(), web, Arc::new(MemoryNotifier::new()))
        .run(&catalog, now())
        .await
        .unwrap();

    // Not framed as "entire page removed".
    assert_eq!(outcome.events_changed, 0);
    assert_eq!(
        store.snapshot("f", PageRole::Main).as_deref(),
        Some("<p>long history</p>")
    );
}

#[tokio::test]
async fn no_changes_renders_notice_without_table() {
    let store = Arc::new(
        MemorySnapshotStore::new()
            .with_snapshot("a", PageRole::Main, "<p>same</p>")
            .with_snapshot("b", PageRole::ImportantDates, "<ul><li>Oct 1</li></ul>"),
    );
    let web = Arc::new(StubWeb::default());
    web.serve("https://a.test/", "<p>same</p>");
    // Layout-only whitespace differences are not drift.
    web.serve("https://b.test/dates", "<ul>\n  <li>Oct   1</li>\n</ul>");
    let notifier = Arc::new(MemoryNotifier::new());
    let catalog = EventCatalog::from_events(vec![
        TrackedEvent::new("a").with_url("https://a.test/"),
        TrackedEvent::new("b").with_important_date_url("https://b.test/dates"),
    ])
    .unwrap();

    let outcome = job(store, web, notifier.clone())
        .run(&catalog, now())
        .await
        .unwrap();

    assert_eq!(outcome.events_changed, 0);
    let body = &notifier.sent()[0].html_body;
    assert!(body.contains("No changes detected in any monitored events"));
    assert!(!body.contains("<table"));
}

#[tokio::test]
async fn second_run_without_live_changes_is_quiet() {
    let store = Arc::new(MemorySnapshotStore::new());
    let web = Arc::new(StubWeb::default());
    web.serve("https://a.test/", "<h1>ICFP 2027</h1><p>Call for papers</p>");
    web.serve("https://a.test/dates", "<p>Submission: March 1</p>");
    let notifier = Arc::new(MemoryNotifier::new());
    let catalog = EventCatalog::from_events(vec![TrackedEvent::new("a")
        .with_url("https://a.test/")
        .with_important_date_url("https://a.test/dates")])
    .unwrap();
    let job = job(store, web, notifier.clone());

    let first = job.run(&catalog, now()).await.unwrap();
    assert_eq!(first.events_changed, 1);
    assert_eq!(first.snapshots_written, 2);

    let second = job.run(&catalog, now()).await.unwrap();
    assert_eq!(second.events_changed, 0);
    for event in &second.report.events {
        assert!(!event.has_changes());
    }
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn notify_failure_still_persists_snapshots() {
    let store = Arc::new(MemorySnapshotStore::new());
    let web = Arc::new(StubWeb::default());
    web.serve("https://a.test/", "<p>new</p>");
    let notifier = Arc::new(MemoryNotifier::refusing());
    let catalog =
        EventCatalog::from_events(vec![TrackedEvent::new("a").with_url("https://a.test/")])
            .unwrap();

    let outcome = job(store.clone(), web, notifier)
        .run(&catalog, now())
        .await
        .unwrap();

    assert!(!outcome.notified);
    assert_eq!(store.snapshot("a", PageRole::Main).as_deref(), Some("<p>new</p>"));
}

#[tokio::test]
async fn storage_faults_stay_confined_to_one_page() {
    let memory = Arc::new(
        MemorySnapshotStore::new()
            .with_snapshot("a", PageRole::Main, "<p>old a</p>")
            .with_snapshot("b", PageRole::Main, "<p>b</p>"),
    );
    let faulty = Arc::new(
        FaultyStore::new(memory.clone())
            .fail_read("a", PageRole::Main)
            .fail_write("b", PageRole::Main),
    );
    let web = Arc::new(StubWeb::default());
    web.serve("https://a.test/", "<p>old a</p>");
    web.serve("https://b.test/", "<p>b changed</p>");
    let catalog = EventCatalog::from_events(vec![
        TrackedEvent::new("a").with_url("https://a.test/"),
        TrackedEvent::new("b").with_url("https://b.test/"),
    ])
    .unwrap();

    let outcome = job(faulty, web, Arc::new(MemoryNotifier::new()))
        .run(&catalog, now())
        .await
        .unwrap();

    // An unreadable snapshot is an empty baseline.
    let a = outcome.report.events.iter().find(|e| e.abbreviation == "a").unwrap();
    assert_eq!(a.main.as_ref().unwrap().removed_count, 0);
    assert!(a.main.as_ref().unwrap().has_changes);

    assert_eq!(outcome.snapshots_written, 1);
    assert_eq!(outcome.snapshot_write_failures, 1);
    assert_eq!(memory.snapshot("b", PageRole::Main).as_deref(), Some("<p>b</p>"));
}

#[tokio::test]
async fn inactive_events_are_not_fetched_or_reported() {
    let store = Arc::new(MemorySnapshotStore::new());
    let web = Arc::new(StubWeb::default());
    web.serve("https://old.test/", "<p>2019</p>");
    web.serve("https://next.test/", "<p>2027</p>");
    web.serve("https://tbd.test/", "<p>soon</p>");
    let past = NaiveDate::from_ymd_opt(2019, 6, 1).unwrap();
    let future = NaiveDate::from_ymd_opt(2027, 6, 1).unwrap();
    let catalog = EventCatalog::from_events(vec![
        TrackedEvent::new("old")
            .with_url("https://old.test/")
            .with_end(MaybeDate::Date(past)),
        TrackedEvent::new("next")
            .with_url("https://next.test/")
            .with_end(MaybeDate::Date(future)),
        TrackedEvent::new("tbd").with_url("https://tbd.test/"),
    ])
    .unwrap();

    let outcome = job(store.clone(), web.clone(), Arc::new(MemoryNotifier::new()))
        .run(&catalog, now())
        .await
        .unwrap();

    assert_eq!(outcome.tracked, 3);
    assert_eq!(outcome.active, 2);
    let reported: Vec<_> = outcome
        .report
        .events
        .iter()
        .map(|e| e.abbreviation.as_str())
        .collect();
    assert_eq!(reported, ["next", "tbd"]);
    assert_eq!(
        web.requested(),
        vec![
            ("https://next.test/".to_string(), PageRole::Main),
            ("https://tbd.test/".to_string(), PageRole::Main),
        ]
    );
    assert_eq!(store.snapshot("old", PageRole::Main), None);

    let mut read: Vec<_> = store.reads().into_iter().map(|k| k.event_id).collect();
    read.sort();
    read.dedup();
    assert_eq!(read, ["next", "tbd"]);
}

/// Snapshot reads that stay pending until some page fetch has started.
struct GatedStore {
    open: watch::Receiver<bool>,
}

#[async_trait]
impl SnapshotStore for GatedStore {
    async fn get(&self, _key: &SnapshotKey) -> StoreResult<Option<String>> {
        let mut open = self.open.clone();
        open.wait_for(|open| *open)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(None)
    }

    async fn put(&self, _key: &SnapshotKey, _html: &str) -> StoreResult<()> {
        Ok(())
    }
}

/// Opens the gate of a [`GatedStore`] on its first request.
struct GateOpeningWeb {
    gate: watch::Sender<bool>,
}

#[async_trait]
impl PageFetcher for GateOpeningWeb {
    async fn fetch(&self, _url: &str, _role: PageRole) -> Result<String, FetchError> {
        self.gate.send_replace(true);
        Ok("<p>live</p>".to_string())
    }
}

#[tokio::test]
async fn snapshot_reads_and_page_fetches_overlap() {
    let (gate, open) = watch::channel(false);
    let job = DriftJob::new(
        Arc::new(GatedStore { open }),
        Arc::new(GateOpeningWeb { gate }),
        Arc::new(MemoryNotifier::new()),
        settings(),
    );
    let catalog = EventCatalog::from_events(vec![
        TrackedEvent::new("a").with_url("https://a.test/"),
        TrackedEvent::new("b").with_url("https://b.test/"),
    ])
    .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), job.run(&catalog, now()))
        .await
        .expect("snapshot reads waited for fetches that never started")
        .unwrap();
    assert_eq!(outcome.active, 2);
    assert_eq!(outcome.events_changed, 2);
}
