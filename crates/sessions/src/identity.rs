//! Identity record store: the durable session id → identity map.
//!
//! The whole map is one JSON object stored under a single well-known key:
//!
//! ```json
//! { "16045690984503098046": { "kind": "password", "roles": ["member"] } }
//! ```
//!
//! Map keys are the decimal rendering of the session id.  Every operation,
//! reads included, runs under the same [`DistributedLock`], so a reader
//! never interleaves with a read-modify-write in flight.  The lock covers the
//! whole map rather than one key.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use mk_domain::error::{Error, Result};
use mk_domain::session::{Identity, SessionId};
use mk_domain::trace::TraceEvent;

use crate::lock::DistributedLock;
use crate::objects::ObjectStore;

type IdentityMap = BTreeMap<String, Identity>;

fn map_key(id: SessionId) -> String {
    id.0.to_string()
}

pub struct IdentityStore {
    objects: Arc<dyn ObjectStore>,
    lock: DistributedLock,
    key: String,
}

impl IdentityStore {
    pub fn new(objects: Arc<dyn ObjectStore>, lock: DistributedLock, key: impl Into<String>) -> Self {
        Self {
            objects,
            lock,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Make sure the blob exists, writing an empty map if it does not.
    /// Idempotent; an existing map is left untouched.
    pub async fn init(&self, cancel: &CancellationToken) -> Result<()> {
        self.locked(cancel, || async {
            if self.objects.get(&self.key).await?.is_none() {
                self.save(&IdentityMap::new()).await?;
                tracing::info!(key = %self.key, "initialized empty identity map");
            }
            Ok(())
        })
        .await
    }

    /// Look up the identity recorded for `id`.
    ///
    /// A missing record is [`Error::SessionNotFound`], as is a blob that was
    /// never initialized.  Backend failures pass through unchanged.
    pub async fn get_identity(&self, cancel: &CancellationToken, id: SessionId) -> Result<Identity> {
        self.locked(cancel, || async {
            let Some(map) = self.load().await? else {
                tracing::debug!(key = %self.key, "identity map not initialized");
                return Err(Error::SessionNotFound);
            };
            map.get(&map_key(id)).cloned().ok_or(Error::SessionNotFound)
        })
        .await
    }

    /// Insert or overwrite the identity for `id`.  A missing blob is
    /// treated as an empty map.
    pub async fn store_identity(
        &self,
        cancel: &CancellationToken,
        id: SessionId,
        identity: Identity,
    ) -> Result<()> {
        self.locked(cancel, || async {
            let mut map = self.load().await?.unwrap_or_default();
            let kind = identity.kind.clone();
            let roles = identity.roles.len();
            map.insert(map_key(id), identity);
            self.save(&map).await?;

            TraceEvent::IdentityStored {
                session_id: id.to_string(),
                kind,
                roles,
            }
            .emit();
            Ok(())
        })
        .await
    }

    /// Remove the identity for `id`.  Removing an absent record is a no-op.
    pub async fn delete_identity(&self, cancel: &CancellationToken, id: SessionId) -> Result<()> {
        self.locked(cancel, || async {
            let Some(mut map) = self.load().await? else {
                return Ok(());
            };
            let existed = map.remove(&map_key(id)).is_some();
            if existed {
                self.save(&map).await?;
            }

            TraceEvent::IdentityDeleted {
                session_id: id.to_string(),
                existed,
            }
            .emit();
            Ok(())
        })
        .await
    }

    /// Run `f` inside the lock, always unlocking afterwards.
    async fn locked<T, F, Fut>(&self, cancel: &CancellationToken, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let guard = self.lock.lock(cancel).await?;
        let out = f().await;
        guard.unlock().await;
        out
    }

    async fn load(&self) -> Result<Option<IdentityMap>> {
        match self.objects.get(&self.key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, map: &IdentityMap) -> Result<()> {
        let bytes = serde_json::to_vec(map)?;
        self.objects.put(&self.key, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::lock::{LockBackend, LockManager, LockOptions, MemoryLeaseBackend};
    use crate::objects::MemoryObjectStore;
    use async_trait::async_trait;

    const KEY: &str = "identities.json";

    fn store_over(objects: Arc<dyn ObjectStore>) -> IdentityStore {
        let locks = LockManager::local(LockOptions::default());
        IdentityStore::new(objects, locks.lock_for("identities"), KEY)
    }

    fn member() -> Identity {
        Identity::new("password", ["member"])
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let objects = Arc::new(MemoryObjectStore::new());
        let store = store_over(objects.clone());
        let cancel = CancellationToken::new();

        store.init(&cancel).await.unwrap();
        assert_eq!(objects.get(KEY).await.unwrap().unwrap(), b"{}");

        store.store_identity(&cancel, SessionId(1), member()).await.unwrap();
        store.init(&cancel).await.unwrap();
        assert_eq!(store.get_identity(&cancel, SessionId(1)).await.unwrap(), member());
    }

    #[tokio::test]
    async fn get_before_init_is_not_found() {
        let store = store_over(Arc::new(MemoryObjectStore::new()));
        let err = store
            .get_identity(&CancellationToken::new(), SessionId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionNotFound));
    }

    #[tokio::test]
    async fn store_without_init_creates_map() {
        let store = store_over(Arc::new(MemoryObjectStore::new()));
        let cancel = CancellationToken::new();
        store.store_identity(&cancel, SessionId(9), member()).await.unwrap();
        assert_eq!(store.get_identity(&cancel, SessionId(9)).await.unwrap(), member());
    }

    #[tokio::test]
    async fn last_write_wins() {
        let store = store_over(Arc::new(MemoryObjectStore::new()));
        let cancel = CancellationToken::new();
        let admin = Identity::new("password", ["member", "admin"]);

        store.store_identity(&cancel, SessionId(5), member()).await.unwrap();
        store.store_identity(&cancel, SessionId(5), admin.clone()).await.unwrap();
        assert_eq!(store.get_identity(&cancel, SessionId(5)).await.unwrap(), admin);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let store = store_over(Arc::new(MemoryObjectStore::new()));
        let cancel = CancellationToken::new();

        store.store_identity(&cancel, SessionId(5), member()).await.unwrap();
        store.delete_identity(&cancel, SessionId(5)).await.unwrap();
        assert!(matches!(
            store.get_identity(&cancel, SessionId(5)).await,
            Err(Error::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn delete_absent_is_noop() {
        let objects = Arc::new(MemoryObjectStore::new());
        let store = store_over(objects.clone());
        let cancel = CancellationToken::new();

        store.delete_identity(&cancel, SessionId(5)).await.unwrap();
        assert!(objects.is_empty());

        store.store_identity(&cancel, SessionId(1), member()).await.unwrap();
        store.delete_identity(&cancel, SessionId(2)).await.unwrap();
        assert_eq!(store.get_identity(&cancel, SessionId(1)).await.unwrap(), member());
    }

    #[tokio::test]
    async fn persisted_layout_uses_decimal_keys() {
        let objects = Arc::new(MemoryObjectStore::new());
        let store = store_over(objects.clone());
        store
            .store_identity(&CancellationToken::new(), SessionId(42), member())
            .await
            .unwrap();

        let raw = objects.get(KEY).await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "42": { "kind": "password", "roles": ["member"] } })
        );
    }

    #[tokio::test]
    async fn corrupt_blob_is_an_error_not_not_found() {
        let objects = Arc::new(MemoryObjectStore::new());
        objects.put(KEY, b"[oops".to_vec()).await.unwrap();
        let store = store_over(objects);
        let err = store
            .get_identity(&CancellationToken::new(), SessionId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    struct Offline;

    #[async_trait]
    impl ObjectStore for Offline {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(Error::Storage("bucket unreachable".into()))
        }
        async fn put(&self, _key: &str, _bytes: Vec<u8>) -> Result<()> {
            Err(Error::Storage("bucket unreachable".into()))
        }
    }

    #[tokio::test]
    async fn backend_errors_are_not_remapped() {
        let store = store_over(Arc::new(Offline));
        let cancel = CancellationToken::new();
        assert!(matches!(
            store.get_identity(&cancel, SessionId(1)).await,
            Err(Error::Storage(_))
        ));
        assert!(matches!(
            store.store_identity(&cancel, SessionId(1), member()).await,
            Err(Error::Storage(_))
        ));
        assert!(matches!(store.init(&cancel).await, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn lock_is_released_after_failure() {
        let store = store_over(Arc::new(Offline));
        let cancel = CancellationToken::new();
        for _ in 0..3 {
            assert!(store.get_identity(&cancel, SessionId(1)).await.is_err());
        }
    }

    #[tokio::test]
    async fn cancelled_caller_never_reaches_storage() {
        let store = store_over(Arc::new(Offline));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            store.get_identity(&cancel, SessionId(1)).await,
            Err(Error::Cancelled)
        ));
    }

    struct SlowReads(MemoryObjectStore);

    #[async_trait]
    impl ObjectStore for SlowReads {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.0.get(key).await
        }
        async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
            self.0.put(key, bytes).await
        }
    }

    #[tokio::test]
    async fn abandoned_caller_does_not_hold_shared_lease() {
        let leases: Arc<dyn LockBackend> = Arc::new(MemoryLeaseBackend::new());
        let locks = LockManager::shared(
            leases,
            LockOptions {
                lease: Duration::from_secs(300),
                acquire_timeout: Duration::from_secs(2),
                retry_interval: Duration::from_millis(5),
            },
        );
        let store = IdentityStore::new(
            Arc::new(SlowReads(MemoryObjectStore::new())),
            locks.lock_for("identities"),
            KEY,
        );
        let cancel = CancellationToken::new();

        // Dropped while inside the critical section, like a request whose
        // client disconnected.
        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), store.get_identity(&cancel, SessionId(1)))
                .await;
        assert!(abandoned.is_err());

        assert!(matches!(
            store.get_identity(&cancel, SessionId(1)).await,
            Err(Error::SessionNotFound)
        ));
    }
}
