//! Drift Core Library
//!
//! Watches the main and important-dates pages of tracked conferences,
//! diffs their visible text against the last stored snapshot and mails the
//! operator one HTML report per run.

pub mod catalog;
pub mod config;
pub mod diff;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod job;
pub mod notify;
pub mod obs;
pub mod report;
pub mod schedule;
pub mod telemetry;

pub use catalog::{EventCatalog, EventDates, MaybeDate, TrackedEvent};
pub use config::{DriftConfig, MailTransport};
pub use diff::{diff, diff_pages, DiffSegment, DriftSummary, SegmentTag};
pub use error::{CatalogError, DriftError, FetchError, NotifyError, Result};
pub use extract::{extract_text, normalize_whitespace};
pub use fetch::{
    fetch_current, load_prior, EventPages, FetchOutcome, FetchSettings, HttpFetcher, PageFetcher,
    PriorPages,
};
pub use job::{DriftJob, JobSettings, RunOutcome};
pub use notify::{HttpMailer, MemoryNotifier, Notification, Notifier, OutboxNotifier};
pub use report::{render, EventDrift, RenderedReport, Report};
pub use schedule::{next_run_after, run_daily};
pub use telemetry::init_tracing;

pub use drift_store::{FsSnapshotStore, PageRole, SnapshotKey, SnapshotStore, StoreError};

/// Version of the drift checker.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
