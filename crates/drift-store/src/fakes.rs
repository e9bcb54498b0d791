//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemorySnapshotStore`, which satisfies the `SnapshotStore`
//! contract without touching disk, and `FaultyStore`, which wraps any store
//! and fails selected reads or writes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemorySnapshotStore
// ---------------------------------------------------------------------------

/// In-memory snapshot store backed by a `HashMap<SnapshotKey, html>`.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    store: Mutex<HashMap<SnapshotKey, String>>,
    gets: Mutex<Vec<SnapshotKey>>,
    puts: Mutex<Vec<SnapshotKey>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a snapshot without recording it as a write.
    pub fn with_snapshot(self, event_id: &str, role: PageRole, html: &str) -> Self {
        self.store
            .lock()
            .unwrap()
            .insert(SnapshotKey::new(event_id, role), html.to_string());
        self
    }

    /// Synchronous peek at a stored snapshot.
    pub fn snapshot(&self, event_id: &str, role: PageRole) -> Option<String> {
        self.store
            .lock()
            .unwrap()
            .get(&SnapshotKey::new(event_id, role))
            .cloned()
    }

    /// Every key read through `get`, in call order.
    pub fn reads(&self) -> Vec<SnapshotKey> {
        self.gets.lock().unwrap().clone()
    }

    /// Every key written through `put`, in call order.
    pub fn writes(&self) -> Vec<SnapshotKey> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get(&self, key: &SnapshotKey) -> StoreResult<Option<String>> {
        key.object_name()?;
        self.gets.lock().unwrap().push(key.clone());
        let store = self.store.lock().unwrap();
        Ok(store.get(key).cloned())
    }

    async fn put(&self, key: &SnapshotKey, html: &str) -> StoreResult<()> {
        key.object_name()?;
        self.store
            .lock()
            .unwrap()
            .insert(key.clone(), html.to_string());
        self.puts.lock().unwrap().push(key.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FaultyStore
// ---------------------------------------------------------------------------

/// Wraps a store and fails reads or writes for chosen keys.
pub struct FaultyStore {
    inner: Arc<dyn SnapshotStore>,
    failing_reads: HashSet<SnapshotKey>,
    failing_writes: HashSet<SnapshotKey>,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn SnapshotStore>) -> Self {
        Self {
            inner,
            failing_reads: HashSet::new(),
            failing_writes: HashSet::new(),
        }
    }

    /// Make `get` fail for this page.
    pub fn fail_read(mut self, event_id: &str, role: PageRole) -> Self {
        self.failing_reads.insert(SnapshotKey::new(event_id, role));
        self
    }

    /// Make `put` fail for this page.
    pub fn fail_write(mut self, event_id: &str, role: PageRole) -> Self {
        self.failing_writes.insert(SnapshotKey::new(event_id, role));
        self
    }
}

#[async_trait]
impl SnapshotStore for FaultyStore {
    async fn get(&self, key: &SnapshotKey) -> StoreResult<Option<String>> {
        if self.failing_reads.contains(key) {
            return Err(StoreError::Backend(format!("injected read failure for {key}")));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &SnapshotKey, html: &str) -> StoreResult<()> {
        if self.failing_writes.contains(key) {
            return Err(StoreError::Backend(format!("injected write failure for {key}")));
        }
        self.inner.put(key, html).await
    }
}
