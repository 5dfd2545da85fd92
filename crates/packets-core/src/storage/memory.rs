//! In-memory authoritative store

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::PacketResult;
use crate::services::StorageService;

#[derive(Debug, Default)]
struct MemoryInner {
    files: BTreeMap<String, Vec<u8>>,
    folders: BTreeSet<String>,
    /// Paths passed to `write`, in order
    writes: Vec<String>,
    fail_writes: bool,
}

/// Shared in-memory store. Clones see the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a file in place without recording a write
    pub fn insert(&self, path: &str, contents: impl Into<Vec<u8>>) {
        self.inner
            .lock()
            .files
            .insert(path.to_string(), contents.into());
    }

    /// Delete a file. Returns whether it existed.
    pub fn remove(&self, path: &str) -> bool {
        self.inner.lock().files.remove(path).is_some()
    }

    /// Current contents of a file
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.lock().files.get(path).cloned()
    }

    /// Whether a file or folder exists
    pub fn exists(&self, path: &str) -> bool {
        let inner = self.inner.lock();
        inner.files.contains_key(path) || inner.folders.contains(path)
    }

    /// Every path written so far, in order
    pub fn writes(&self) -> Vec<String> {
        self.inner.lock().writes.clone()
    }

    /// Number of writes to one path
    pub fn writes_to(&self, path: &str) -> usize {
        self.inner.lock().writes.iter().filter(|p| *p == path).count()
    }

    /// Make every following write report failure
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }
}

#[async_trait]
impl StorageService for MemoryStorage {
    async fn ensure_exists(&self, path: &str, default: Option<&[u8]>) -> PacketResult<()> {
        let mut inner = self.inner.lock();
        match default {
            None => {
                inner.folders.insert(path.to_string());
            }
            Some(contents) => {
                inner
                    .files
                    .entry(path.to_string())
                    .or_insert_with(|| contents.to_vec());
            }
        }
        Ok(())
    }

    async fn read(&self, path: &str) -> PacketResult<Option<Vec<u8>>> {
        let inner = self.inner.lock();
        Ok(inner.files.get(path).filter(|c| !c.is_empty()).cloned())
    }

    async fn write(&self, path: &str, contents: &[u8]) -> PacketResult<bool> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Ok(false);
        }
        inner.files.insert(path.to_string(), contents.to_vec());
        inner.writes.push(path.to_string());
        Ok(true)
    }
}
