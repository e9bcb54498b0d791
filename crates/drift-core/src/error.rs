//! Error taxonomy for the drift checker.
//!
//! Per-page failures (fetches, snapshot reads and writes) are recovered
//! inside a run and never surface as `DriftError`; only failures that stop
//! a run from starting at all do.

use drift_store::StoreError;

/// Errors produced while loading the event catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid date {value:?}: expected TBD, YYYY-MM-DD or YYYY/MM/DD")]
    InvalidDate { value: String },

    #[error("event abbreviation must not be empty")]
    EmptyAbbreviation,

    #[error("duplicate event abbreviation: {0}")]
    DuplicateEvent(String),
}

/// A single page fetch failure.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("body of {url} could not be read: {reason}")]
    Body { url: String, reason: String },
}

/// Notification dispatch failure.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("mail relay request failed: {0}")]
    Transport(String),

    #[error("mail relay rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to write report to outbox: {0}")]
    Outbox(#[from] std::io::Error),

    #[error("notification refused: {0}")]
    Refused(String),
}

/// Drift checker errors.
#[derive(Debug, thiserror::Error)]
pub enum DriftError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("http client error: {0}")]
    HttpClient(String),

    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for drift checker operations.
pub type Result<T> = std::result::Result<T, DriftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drift_error_display() {
        let err = DriftError::Config("NOTIFICATION_EMAIL is not set".to_string());
        assert!(err.to_string().contains("configuration error"));

        let err: DriftError = CatalogError::DuplicateEvent("pldi".to_string()).into();
        assert!(err.to_string().contains("duplicate event abbreviation: pldi"));
    }

    #[test]
    fn test_fetch_error_mentions_url() {
        let err = FetchError::Status {
            url: "https://popl26.example.org".to_string(),
            status: 503,
        };
        let msg = err.to_string();
        assert!(msg.contains("popl26.example.org"));
        assert!(msg.contains("503"));
    }
}
