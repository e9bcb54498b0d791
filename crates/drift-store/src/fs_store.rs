use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StoreError;
use crate::storage_traits::{SnapshotKey, SnapshotStore, StoreResult};

/// Directory-backed snapshot store.
///
/// The directory plays the role of the bucket: every snapshot is a flat file
/// named by [`SnapshotKey::object_name`], holding raw HTML.
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    root: PathBuf,
}

impl FsSnapshotStore {
    /// Create a store rooted at `root`. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            object: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &SnapshotKey) -> StoreResult<(String, PathBuf)> {
        let name = key.object_name()?;
        let path = self.root.join(&name);
        Ok((name, path))
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn get(&self, key: &SnapshotKey) -> StoreResult<Option<String>> {
        let (object, path) = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| StoreError::Encoding { object }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { object, source }),
        }
    }

    async fn put(&self, key: &SnapshotKey, html: &str) -> StoreResult<()> {
        let (object, path) = self.object_path(key)?;
        let root = self.root.clone();
        let data = html.as_bytes().to_vec();
        let name = object.clone();

        // Atomic write: temp file in the same directory, then rename.
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = NamedTempFile::new_in(&root)?;
            tmp.write_all(&data)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Backend(format!("write task for {name} failed: {e}")))?
        .map_err(|source| StoreError::Io { object, source })?;

        debug!(key = %key, bytes = html.len(), "snapshot stored");
        Ok(())
    }
}
