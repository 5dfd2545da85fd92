//! Filesystem-backed authoritative store

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{PacketError, PacketResult};
use crate::services::StorageService;

/// Storage rooted at a directory. Paths are relative to the root and may
/// not escape it.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Create storage rooted at `root`, creating the directory if needed
    pub fn new(root: impl AsRef<Path>) -> PacketResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PacketResult<PathBuf> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(PacketError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageService for FsStorage {
    async fn ensure_exists(&self, path: &str, default: Option<&[u8]>) -> PacketResult<()> {
        let full = self.resolve(path)?;
        match default {
            None => tokio::fs::create_dir_all(&full).await?,
            Some(contents) => {
                if !tokio::fs::try_exists(&full).await? {
                    if let Some(parent) = full.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(&full, contents).await?;
                    debug!(%path, "Created file with default contents");
                }
            }
        }
        Ok(())
    }

    async fn read(&self, path: &str) -> PacketResult<Option<Vec<u8>>> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, path: &str, contents: &[u8]) -> PacketResult<bool> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write then rename so readers never see a partial file
        let mut staging = full.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        tokio::fs::write(&staging, contents).await?;
        tokio::fs::rename(&staging, &full).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_and_read() {
        let temp_dir = tempdir().unwrap();
        let storage = FsStorage::new(temp_dir.path()).unwrap();

        assert!(storage.write("packets/modules/oif/a.json", b"{}").await.unwrap());
        let contents = storage.read("packets/modules/oif/a.json").await.unwrap();
        assert_eq!(contents, Some(b"{}".to_vec()));
        assert!(temp_dir.path().join("packets/modules/oif/a.json").exists());
    }

    #[tokio::test]
    async fn test_missing_and_empty_read_as_none() {
        let temp_dir = tempdir().unwrap();
        let storage = FsStorage::new(temp_dir.path()).unwrap();

        assert_eq!(storage.read("nope.json").await.unwrap(), None);

        std::fs::write(temp_dir.path().join("empty.json"), b"").unwrap();
        assert_eq!(storage.read("empty.json").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ensure_exists_keeps_existing_file() {
        let temp_dir = tempdir().unwrap();
        let storage = FsStorage::new(temp_dir.path()).unwrap();

        storage.ensure_exists("packets", None).await.unwrap();
        assert!(temp_dir.path().join("packets").is_dir());

        storage
            .ensure_exists("packets/packets.json", Some(b"first"))
            .await
            .unwrap();
        storage
            .ensure_exists("packets/packets.json", Some(b"second"))
            .await
            .unwrap();
        let contents = storage.read("packets/packets.json").await.unwrap();
        assert_eq!(contents, Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let temp_dir = tempdir().unwrap();
        let storage = FsStorage::new(temp_dir.path()).unwrap();

        let err = storage.write("../outside.json", b"x").await.unwrap_err();
        assert!(matches!(err, PacketError::InvalidPath(_)));
        assert!(storage.read("/etc/passwd").await.is_err());
        assert!(storage.read("").await.is_err());
    }
}
