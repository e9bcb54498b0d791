//! Drift-Store: snapshot persistence for the drift checker
//!
//! Every tracked page keeps exactly one stored copy of the raw HTML seen on
//! the last successful fetch. The next run diffs against it and then
//! overwrites it.
//!
//! ## Key Components
//!
//! - `SnapshotStore`: async get/put of the last-known HTML per page
//! - `SnapshotKey` / `PageRole`: addressing by event and page role
//! - `FsSnapshotStore`: directory-backed store with atomic writes
//! - `fakes`: in-memory and failure-injecting stores for tests

mod error;
pub mod fakes;
mod fs_store;
pub mod storage_traits;

pub use error::StoreError;
pub use fs_store::FsSnapshotStore;
pub use storage_traits::{PageRole, SnapshotKey, SnapshotStore, StoreResult};
