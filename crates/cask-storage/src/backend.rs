//! The storage interface all backends implement, plus the local filesystem
//! backend that is the only concrete implementation this workspace ships.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use cask_core::{CaskError, Key, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Content-addressed object storage. Implementations must be safe to share
/// across tasks behind an `Arc`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable backend name, for logging.
    fn name(&self) -> &str;

    async fn write(&self, key: &Key, data: Bytes) -> Result<()>;

    async fn read(&self, key: &Key) -> Result<Bytes>;

    async fn exists(&self, key: &Key) -> bool;

    async fn delete(&self, key: &Key) -> Result<()>;

    /// Bytes of free space remaining, when the backend can report it.
    /// Object-store backends have no such notion, so the default is `0`.
    async fn free_space(&self) -> u64 {
        0
    }

    /// Readable root, writable smoke test. Used by the AAE loop's fail-fast
    /// mount-loss check.
    async fn health_check(&self) -> Result<()>;

    /// Lets the AAE walker downcast to backend-specific sweep strategies
    /// (only `LocalBackend` needs a filesystem root to walk today).
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Stores objects under `root/<algorithm>/<20 two-char hex segments>/data`.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_dir(&self, key: &Key) -> PathBuf {
        self.root.join(key.algorithm()).join(key.as_path())
    }

    pub fn object_path(&self, key: &Key) -> PathBuf {
        self.object_dir(key).join("data")
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &str {
        "Disk"
    }

    async fn write(&self, key: &Key, data: Bytes) -> Result<()> {
        let dir = self.object_dir(key);
        fs::create_dir_all(&dir).await.map_err(|e| {
            warn!(path = %dir.display(), error = %e, "couldn't make directory path");
            e
        })?;

        let path = dir.join("data");
        let mut f = fs::File::create(&path).await?;
        f.write_all(&data).await?;
        f.sync_all().await?;
        debug!(path = %path.display(), bytes = data.len(), "wrote object");
        Ok(())
    }

    async fn read(&self, key: &Key) -> Result<Bytes> {
        let path = self.object_path(key);
        let data = fs::read(&path)
            .await
            .map_err(|_| CaskError::NotFound(key.to_string()))?;
        Ok(Bytes::from(data))
    }

    async fn exists(&self, key: &Key) -> bool {
        fs::metadata(self.object_path(key)).await.is_ok()
    }

    async fn delete(&self, key: &Key) -> Result<()> {
        let dir = self.object_dir(key);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn health_check(&self) -> Result<()> {
        fs::read_dir(&self.root).await?;
        let probe = self.root.join(".cask_health_check");
        fs::write(&probe, b"ok").await?;
        let _ = fs::remove_file(&probe).await;
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Key {
        Key::from_string("sha1:ae28605f0ffc34fe5314342f78efaa13ee45f699").unwrap()
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let k = key();
        backend.write(&k, Bytes::from_static(b"hello")).await.unwrap();
        assert!(backend.exists(&k).await);
        let data = backend.read(&k).await.unwrap();
        assert_eq!(&data[..], b"hello");
    }

    #[tokio::test]
    async fn read_missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let err = backend.read(&key()).await.unwrap_err();
        assert_eq!(err.http_status(), 404);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let k = key();
        backend.write(&k, Bytes::from_static(b"x")).await.unwrap();
        backend.delete(&k).await.unwrap();
        assert!(!backend.exists(&k).await);
        backend.delete(&k).await.unwrap();
    }

    #[tokio::test]
    async fn object_path_uses_twenty_segment_layout() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let path = backend.object_path(&key());
        let rel = path.strip_prefix(dir.path()).unwrap();
        assert_eq!(rel.components().count(), 22); // "sha1" + 20 hex segments + "data"
    }

    #[tokio::test]
    async fn health_check_fails_on_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let backend = LocalBackend::new(&missing);
        assert!(backend.health_check().await.is_err());
    }
}
