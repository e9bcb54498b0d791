//! Error types for drift-store

use thiserror::Error;

/// Errors that can occur in the snapshot persistence layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// Event identifier cannot be turned into an object name
    #[error("invalid snapshot key: {event_id:?}")]
    InvalidKey { event_id: String },

    /// Filesystem failure
    #[error("snapshot io failed for {object}: {source}")]
    Io {
        object: String,
        #[source]
        source: std::io::Error,
    },

    /// Stored bytes are not valid UTF-8
    #[error("snapshot {object} is not valid UTF-8")]
    Encoding { object: String },

    /// Any other backend failure (injected faults, remote stores)
    #[error("snapshot backend error: {0}")]
    Backend(String),
}
