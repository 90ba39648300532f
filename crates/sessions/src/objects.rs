//! Key/value object storage the identity record store persists through.
//!
//! Whole-object `get` and `put` only.  Read-modify-write consistency is up
//! to the caller; the identity store takes its lock around them.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;

use mk_domain::error::{Error, Result};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the object at `key`.  `Ok(None)` means the key does not exist;
    /// errors are reserved for backend failures.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the object at `key`.  Readers observe either the old or the
    /// new bytes, never a mix.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Filesystem
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One file per key under a root directory.  Writes go to a temp file in
/// the same directory and are renamed into place.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        tracing::info!(root = %root.display(), "object store ready");
        Ok(Self { root })
    }

    /// Resolve `key` below the root, refusing anything that could escape it.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        let clean = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(Error::Storage(format!("invalid object key {key:?}")));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        // Spawn blocking to avoid blocking the Tokio executor.
        tokio::task::spawn_blocking(move || -> Result<()> {
            let dir = path.parent().unwrap_or(Path::new("."));
            std::fs::create_dir_all(dir)?;
            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Storage(format!("write task: {e}")))?
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process-local store.  Contents vanish with the process.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.read().get(key).cloned())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.objects.write().insert(key.to_owned(), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path()).unwrap();
        assert!(store.get("identities.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fs_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path()).unwrap();

        store.put("sessions/identities.json", b"{}".to_vec()).await.unwrap();
        store.put("sessions/identities.json", b"{\"1\":{}}".to_vec()).await.unwrap();

        let got = store.get("sessions/identities.json").await.unwrap().unwrap();
        assert_eq!(got, b"{\"1\":{}}");
        assert!(dir.path().join("sessions/identities.json").exists());
    }

    #[tokio::test]
    async fn fs_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path()).unwrap();
        for key in ["", "../outside", "/etc/passwd", "a/../../b"] {
            assert!(
                matches!(store.get(key).await, Err(Error::Storage(_))),
                "accepted {key:?}"
            );
        }
    }

    #[tokio::test]
    async fn memory_put_then_get() {
        let store = MemoryObjectStore::new();
        assert!(store.is_empty());
        store.put("k", vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(vec![1, 2, 3]));
        assert!(store.get("other").await.unwrap().is_none());
        assert_eq!(store.len(), 1);
    }
}
