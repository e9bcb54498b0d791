//! Structured observability hooks for drift runs.
//!
//! This module provides:
//! - Run-scoped tracing spans via `RunSpan` RAII guard
//! - Emission functions for run lifecycle events and recovered failures
//!
//! Every event carries an `event` field (`drift.*`) so log pipelines can
//! filter on it regardless of the output format.

use drift_store::{PageRole, SnapshotKey, StoreError};
use tracing::{error, info, warn};

use crate::error::{FetchError, NotifyError};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("3f1c...");
/// // every log line now carries run_id = "3f1c..."
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("drift.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, tracked: usize, active: usize) {
    info!(event = "drift.run.started", run_id = %run_id, tracked, active);
}

/// Emit event: run finished.
pub fn emit_run_finished(
    run_id: &str,
    duration_ms: u64,
    events_changed: usize,
    notified: bool,
    snapshots_written: usize,
    snapshot_write_failures: usize,
) {
    info!(
        event = "drift.run.finished",
        run_id = %run_id,
        duration_ms,
        events_changed,
        notified,
        snapshots_written,
        snapshot_write_failures,
    );
}

/// Emit event: a catalog record was left out because it did not parse.
pub fn emit_catalog_record_skipped(record: &str, err: &serde_json::Error) {
    warn!(event = "drift.catalog.record_skipped", record = %record, error = %err);
}

/// Emit event: a live page could not be fetched.
pub fn emit_fetch_failed(event_id: &str, role: PageRole, err: &FetchError) {
    warn!(event = "drift.fetch.failed", event_id = %event_id, role = %role, error = %err);
}

/// Emit event: a stored snapshot could not be read.
pub fn emit_snapshot_read_failed(key: &SnapshotKey, err: &StoreError) {
    warn!(event = "drift.snapshot.read_failed", key = %key, error = %err);
}

/// Emit event: a snapshot could not be written.
pub fn emit_snapshot_write_failed(key: &SnapshotKey, err: &StoreError) {
    warn!(event = "drift.snapshot.write_failed", key = %key, error = %err);
}

/// Emit event: drift detected on a page.
pub fn emit_drift_detected(event_id: &str, role: PageRole, added: usize, removed: usize) {
    info!(event = "drift.page.changed", event_id = %event_id, role = %role, added, removed);
}

/// Emit event: the report could not be delivered. The operator learns
/// nothing from this run, so this is logged at error level.
pub fn emit_notify_failed(recipient: &str, err: &NotifyError) {
    error!(event = "drift.notify.failed", recipient = %recipient, error = %err);
}
