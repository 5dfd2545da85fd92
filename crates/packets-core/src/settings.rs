//! Shared settings persistence and the mirror slots built on it
//!
//! [`SettingsStore`] keeps world-scoped settings in redb, one row per key.
//! [`SettingsMirror`] binds one key as the mirror slot. [`MemoryMirror`]
//! is an in-process slot shared between clones.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use redb::{Database, TableDefinition};
use tracing::debug;

use crate::error::{PacketError, PacketResult};
use crate::services::MirrorStore;

// Key: setting name, value: raw bytes
const SETTINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");

/// Settings persistence using redb
#[derive(Clone)]
pub struct SettingsStore {
    db: Arc<RwLock<Database>>,
}

impl SettingsStore {
    /// Open or create the settings database at `path`.
    ///
    /// Creates the parent directory and the settings table if needed.
    pub fn new(path: impl AsRef<Path>) -> PacketResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SETTINGS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    /// Shared database handle
    pub fn db_handle(&self) -> Arc<RwLock<Database>> {
        self.db.clone()
    }

    /// Read a setting
    pub fn get(&self, key: &str) -> PacketResult<Option<Vec<u8>>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(SETTINGS_TABLE)?;
        let value = table.get(key)?.map(|v| v.value().to_vec());
        Ok(value)
    }

    /// Write a setting, overwriting any previous value
    pub fn set(&self, key: &str, value: &[u8]) -> PacketResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS_TABLE)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Delete a setting. Returns whether it existed.
    pub fn remove(&self, key: &str) -> PacketResult<bool> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(SETTINGS_TABLE)?;
            let removed = table.remove(key)?;
            removed.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }
}

/// Mirror slot stored under one settings key
#[derive(Clone)]
pub struct SettingsMirror {
    settings: SettingsStore,
    key: String,
}

impl SettingsMirror {
    /// Bind `key` of `settings` as the mirror slot
    pub fn new(settings: SettingsStore, key: impl Into<String>) -> Self {
        Self {
            settings,
            key: key.into(),
        }
    }

    /// Settings key in use
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl MirrorStore for SettingsMirror {
    async fn read(&self) -> PacketResult<Option<String>> {
        match self.settings.get(&self.key)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| PacketError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn write(&self, blob: String) -> PacketResult<()> {
        self.settings.set(&self.key, blob.as_bytes())?;
        debug!(key = %self.key, bytes = blob.len(), "Mirror written");
        Ok(())
    }
}

/// In-process mirror slot shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryMirror {
    slot: Arc<RwLock<Option<String>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryMirror {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slot holding `blob`
    pub fn with_blob(blob: impl Into<String>) -> Self {
        let mirror = Self::default();
        *mirror.slot.write() = Some(blob.into());
        mirror
    }

    /// Current blob
    pub fn blob(&self) -> Option<String> {
        self.slot.read().clone()
    }

    /// Number of writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MirrorStore for MemoryMirror {
    async fn read(&self) -> PacketResult<Option<String>> {
        Ok(self.slot.read().clone())
    }

    async fn write(&self, blob: String) -> PacketResult<()> {
        *self.slot.write() = Some(blob);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_settings_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let settings = SettingsStore::new(temp_dir.path().join("settings.redb")).unwrap();

        assert_eq!(settings.get("missing").unwrap(), None);

        settings.set("packets.packetsMirror", b"{}").unwrap();
        assert_eq!(
            settings.get("packets.packetsMirror").unwrap(),
            Some(b"{}".to_vec())
        );

        assert!(settings.remove("packets.packetsMirror").unwrap());
        assert!(!settings.remove("packets.packetsMirror").unwrap());
    }

    #[test]
    fn test_settings_persist_across_reopen() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("settings.redb");

        {
            let settings = SettingsStore::new(&path).unwrap();
            settings.set("k", b"v").unwrap();
        }

        let settings = SettingsStore::new(&path).unwrap();
        assert_eq!(settings.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_settings_mirror() {
        let temp_dir = tempdir().unwrap();
        let settings = SettingsStore::new(temp_dir.path().join("settings.redb")).unwrap();
        let mirror = SettingsMirror::new(settings.clone(), "packets.packetsMirror");

        assert_eq!(mirror.read().await.unwrap(), None);
        mirror.write("{\"packets\":[]}".to_string()).await.unwrap();
        assert_eq!(
            mirror.read().await.unwrap().as_deref(),
            Some("{\"packets\":[]}")
        );
        assert!(settings.get("packets.packetsMirror").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_mirror_shared() {
        let mirror = MemoryMirror::new();
        let other = mirror.clone();

        other.write("blob".to_string()).await.unwrap();
        assert_eq!(mirror.blob().as_deref(), Some("blob"));
        assert_eq!(mirror.write_count(), 1);
    }
}
