//! Storage trait definitions for drift snapshots
//!
//! A snapshot is the raw HTML last fetched for one page of one tracked event.
//! Snapshots are addressed by `SnapshotKey` and map onto flat object names
//! (`{event}-main.html`, `{event}-dates.html`) so that any bucket-like
//! backend can hold them.
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Result type for storage operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Addressing
// ---------------------------------------------------------------------------

/// Which of an event's monitored pages a snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageRole {
    /// The conference landing page
    Main,
    /// The page listing submission deadlines and other important dates
    ImportantDates,
}

impl PageRole {
    /// Both roles, in report order.
    pub const ALL: [PageRole; 2] = [PageRole::Main, PageRole::ImportantDates];

    /// Suffix used in object names.
    pub fn object_suffix(&self) -> &'static str {
        match self {
            PageRole::Main => "main",
            PageRole::ImportantDates => "dates",
        }
    }

    /// Human-readable label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            PageRole::Main => "main page",
            PageRole::ImportantDates => "important dates",
        }
    }
}

impl std::fmt::Display for PageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.object_suffix())
    }
}

/// Address of one stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotKey {
    /// Event abbreviation
    pub event_id: String,
    /// Page role
    pub role: PageRole,
}

impl SnapshotKey {
    /// Build a key for an event page.
    pub fn new(event_id: impl Into<String>, role: PageRole) -> Self {
        SnapshotKey {
            event_id: event_id.into(),
            role,
        }
    }

    /// Object name inside the bucket, e.g. `pldi-main.html`.
    ///
    /// Fails for identifiers that could escape a flat namespace.
    pub fn object_name(&self) -> StoreResult<String> {
        let id = &self.event_id;
        let bad = id.is_empty()
            || id.starts_with('.')
            || id.chars().any(|c| c == '/' || c == '\\' || c.is_control());
        if bad {
            return Err(StoreError::InvalidKey {
                event_id: id.clone(),
            });
        }
        Ok(format!("{}-{}.html", id, self.role.object_suffix()))
    }
}

impl std::fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.event_id, self.role)
    }
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Last-known HTML per tracked page.
///
/// Guarantees:
/// - `get` returns `Ok(None)` when nothing was ever stored for the key; this
///   is distinct from a stored empty page (`Ok(Some(""))`).
/// - `put` overwrites unconditionally (last writer wins).
/// - Operations on different keys are independent: a failure for one key
///   says nothing about any other.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Fetch the stored HTML for a page, if any.
    async fn get(&self, key: &SnapshotKey) -> StoreResult<Option<String>>;

    /// Replace the stored HTML for a page.
    async fn put(&self, key: &SnapshotKey, html: &str) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_names_follow_bucket_layout() {
        let main = SnapshotKey::new("pldi", PageRole::Main);
        let dates = SnapshotKey::new("pldi", PageRole::ImportantDates);
        assert_eq!(main.object_name().unwrap(), "pldi-main.html");
        assert_eq!(dates.object_name().unwrap(), "pldi-dates.html");
    }

    #[test]
    fn traversal_ids_are_rejected() {
        for id in ["", "../etc", "a/b", "a\\b", ".hidden"] {
            let key = SnapshotKey::new(id, PageRole::Main);
            assert!(
                matches!(key.object_name(), Err(StoreError::InvalidKey { .. })),
                "{id:?} should be rejected"
            );
        }
    }

    #[test]
    fn role_labels() {
        assert_eq!(PageRole::Main.label(), "main page");
        assert_eq!(PageRole::ImportantDates.label(), "important dates");
        assert_eq!(PageRole::ImportantDates.to_string(), "dates");
    }
}
