//! The drift job driver.
//!
//! One run walks four phases and never goes back:
//!
//! 1. load the stored snapshots of every active event
//! 2. fetch the live pages of every active event
//! 3. diff, build the report, render it and dispatch one notification
//! 4. persist every successfully fetched page as the new snapshot
//!
//! Phases 1 and 2 touch disjoint systems and run concurrently; phase 3
//! starts once both have settled.
//!
//! Failures of a single page stay confined to that page. A failed dispatch
//! is logged at error level but does not stop phase 4.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use drift_store::{PageRole, SnapshotKey, SnapshotStore};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::EventCatalog;
use crate::diff::{diff_pages, DriftSummary};
use crate::error::Result;
use crate::fetch::{fetch_current, load_prior, EventPages, FetchOutcome, PageFetcher, PriorPages};
use crate::notify::{Notification, Notifier};
use crate::obs::{self, RunSpan};
use crate::report::{render, EventDrift, RenderedReport, Report};

/// Addressing and mode of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    /// Sender address of the report
    pub from: String,
    /// Operator address receiving the report
    pub to: String,
    /// Render the report without notifying or persisting
    pub dry_run: bool,
}

/// What one run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub tracked: usize,
    pub active: usize,
    pub events_changed: usize,
    pub fetch_failures: usize,
    pub notified: bool,
    pub snapshots_written: usize,
    pub snapshot_write_failures: usize,
    pub report: Report,
    pub subject: String,
}

/// Drift job with its collaborators injected once per process.
pub struct DriftJob {
    store: Arc<dyn SnapshotStore>,
    fetcher: Arc<dyn PageFetcher>,
    notifier: Arc<dyn Notifier>,
    settings: JobSettings,
}

impl DriftJob {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        fetcher: Arc<dyn PageFetcher>,
        notifier: Arc<dyn Notifier>,
        settings: JobSettings,
    ) -> Self {
        DriftJob {
            store,
            fetcher,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Run all four phases against `catalog` as of `now`.
    ///
    /// Page-level failures are recovered inside the run; the `Result` is
    /// kept for callers that wrap the job in fallible setup.
    pub async fn run(&self, catalog: &EventCatalog, now: DateTime<Utc>) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4().to_string();
        let _span = RunSpan::enter(&run_id);
        let started = Instant::now();

        let today = now.date_naive();
        let active: Vec<_> = catalog.active(today).collect();
        obs::emit_run_started(&run_id, catalog.len(), active.len());

        // Phases 1 and 2
        let (prior, current) = futures::join!(
            load_prior(
                self.store.as_ref(),
                active.iter().map(|e| e.abbreviation.as_str()),
            ),
            fetch_current(self.fetcher.as_ref(), active.iter().copied()),
        );
        let fetch_failures = current
            .values()
            .flat_map(|pages| PageRole::ALL.map(|role| pages.get(role)))
            .filter(|outcome| matches!(outcome, FetchOutcome::Failed(_)))
            .count();

        // Phase 3
        let mut report = Report::new(now);
        for event in &active {
            let Some(pages) = current.get(&event.abbreviation) else {
                continue;
            };
            let prior_pages = prior.get(&event.abbreviation);
            report.events.push(EventDrift {
                abbreviation: event.abbreviation.clone(),
                name: event.display_name().to_string(),
                main_url: event.url.clone(),
                important_dates_url: event.important_date_url.clone(),
                main: drift_for(&event.abbreviation, PageRole::Main, pages, prior_pages),
                important_dates: drift_for(
                    &event.abbreviation,
                    PageRole::ImportantDates,
                    pages,
                    prior_pages,
                ),
            });
        }

        let rendered = render(&report);
        let notified = if self.settings.dry_run {
            info!(subject = %rendered.subject, "dry run, report not sent");
            false
        } else {
            self.dispatch(&rendered).await
        };

        // Phase 4
        let (snapshots_written, snapshot_write_failures) = if self.settings.dry_run {
            (0, 0)
        } else {
            self.persist(&current).await
        };

        let events_changed = report.changed_count();
        obs::emit_run_finished(
            &run_id,
            started.elapsed().as_millis() as u64,
            events_changed,
            notified,
            snapshots_written,
            snapshot_write_failures,
        );

        Ok(RunOutcome {
            run_id,
            tracked: catalog.len(),
            active: active.len(),
            events_changed,
            fetch_failures,
            notified,
            snapshots_written,
            snapshot_write_failures,
            report,
            subject: rendered.subject,
        })
    }

    async fn dispatch(&self, rendered: &RenderedReport) -> bool {
        let notification = Notification {
            from: self.settings.from.clone(),
            to: self.settings.to.clone(),
            subject: rendered.subject.clone(),
            html_body: rendered.body_html.clone(),
        };
        match self.notifier.send(&notification).await {
            Ok(()) => true,
            Err(err) => {
                obs::emit_notify_failed(&self.settings.to, &err);
                false
            }
        }
    }

    /// Overwrite the snapshot of every fetched page, concurrently.
    /// Returns (written, failed).
    async fn persist(&self, current: &BTreeMap<String, EventPages>) -> (usize, usize) {
        let writes = current.iter().flat_map(|(id, pages)| {
            PageRole::ALL.into_iter().filter_map(move |role| {
                let html = pages.get(role).html()?;
                let key = SnapshotKey::new(id, role);
                Some(async move {
                    match self.store.put(&key, html).await {
                        Ok(()) => true,
                        Err(err) => {
                            obs::emit_snapshot_write_failed(&key, &err);
                            false
                        }
                    }
                })
            })
        });

        let results = join_all(writes).await;
        let written = results.iter().filter(|ok| **ok).count();
        (written, results.len() - written)
    }
}

/// Diff one role of one event. Roles that were not fetched this run have
/// no drift at all; a missing snapshot is an empty baseline.
fn drift_for(
    event_id: &str,
    role: PageRole,
    pages: &EventPages,
    prior: Option<&PriorPages>,
) -> Option<DriftSummary> {
    let current = pages.get(role).html()?;
    let previous = prior.and_then(|p| p.get(role)).unwrap_or("");
    let summary = diff_pages(previous, current);
    if summary.has_changes {
        obs::emit_drift_detected(event_id, role, summary.added_count, summary.removed_count);
    } else {
        debug!(event_id, role = %role, "no drift");
    }
    Some(summary)
}
