//! Named, deadline-bounded mutual exclusion.
//!
//! A [`DistributedLock`] takes two components in order:
//!
//! 1. a process-local `tokio::sync::Mutex`, shared by every handle for the
//!    same resource name handed out by one [`LockManager`];
//! 2. when a [`LockBackend`] is configured, a lease on the resource name
//!    with a bounded lifetime, visible to every process sharing the backend.
//!
//! [`LockGuard::unlock`] releases the lease first, then the local mutex.
//! Without a backend the lock is process-local only (single-instance mode).

pub mod file;
pub mod memory;

pub use file::FileLeaseBackend;
pub use memory::MemoryLeaseBackend;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use mk_domain::config::LockConfig;
use mk_domain::error::{Error, Result};

/// A shared lease store.
///
/// Implementations must make `try_acquire` atomic with respect to every
/// other caller of the same backend, including other processes.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Try once to take the lease on `resource` for `holder`.
    ///
    /// Returns `Ok(false)` while another holder's lease is unexpired.  An
    /// expired lease is taken over.
    async fn try_acquire(&self, resource: &str, holder: &str, lease: Duration) -> Result<bool>;

    /// Release `holder`'s lease on `resource`.  Releasing a lease that has
    /// already expired and been taken over is not an error.
    async fn release(&self, resource: &str, holder: &str) -> Result<()>;
}

/// Timing knobs shared by every lock a [`LockManager`] hands out.
#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    /// Lifetime of a shared lease.
    pub lease: Duration,
    /// Upper bound on waiting for either lock component.
    pub acquire_timeout: Duration,
    /// Poll interval while a shared lease is contended.
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(300),
            acquire_timeout: Duration::from_secs(30),
            retry_interval: Duration::from_millis(50),
        }
    }
}

impl From<&LockConfig> for LockOptions {
    fn from(cfg: &LockConfig) -> Self {
        Self {
            lease: cfg.lease(),
            acquire_timeout: cfg.acquire_timeout(),
            retry_interval: cfg.retry_interval(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lock manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Hands out [`DistributedLock`] handles by resource name.
///
/// Each resource name maps to one local mutex, so handles for the same name
/// obtained from the same manager exclude each other.
pub struct LockManager {
    locals: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    backend: Option<Arc<dyn LockBackend>>,
    options: LockOptions,
}

impl LockManager {
    /// Process-local locks only.
    pub fn local(options: LockOptions) -> Self {
        Self {
            locals: Mutex::new(HashMap::new()),
            backend: None,
            options,
        }
    }

    /// Local locks backed by a shared lease store.
    pub fn shared(backend: Arc<dyn LockBackend>, options: LockOptions) -> Self {
        Self {
            locals: Mutex::new(HashMap::new()),
            backend: Some(backend),
            options,
        }
    }

    pub fn lock_for(&self, resource: &str) -> DistributedLock {
        let local = {
            let mut locals = self.locals.lock();
            locals
                .entry(resource.to_owned())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        DistributedLock {
            resource: resource.to_owned(),
            local,
            backend: self.backend.clone(),
            options: self.options,
        }
    }

    /// Number of resource names seen so far.
    pub fn resource_count(&self) -> usize {
        self.locals.lock().len()
    }

    pub fn is_shared(&self) -> bool {
        self.backend.is_some()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lock handle & guard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct DistributedLock {
    resource: String,
    local: Arc<tokio::sync::Mutex<()>>,
    backend: Option<Arc<dyn LockBackend>>,
    options: LockOptions,
}

impl DistributedLock {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Acquire both lock components.
    ///
    /// Fails with [`Error::Cancelled`] when `cancel` fires while waiting,
    /// [`Error::LockTimeout`] when the acquire timeout elapses, or the
    /// backend's own error.  On failure nothing stays held.
    pub async fn lock(&self, cancel: &CancellationToken) -> Result<LockGuard> {
        let started = Instant::now();
        let deadline = started
            .checked_add(self.options.acquire_timeout)
            .ok_or_else(|| Error::Lock("acquire timeout overflows the clock".into()))?;

        let local = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            res = tokio::time::timeout_at(deadline, self.local.clone().lock_owned()) => {
                res.map_err(|_| Error::LockTimeout(self.resource.clone()))?
            }
        };

        let lease = match &self.backend {
            Some(backend) => {
                let holder = uuid::Uuid::new_v4().to_string();
                self.acquire_lease(backend.as_ref(), &holder, deadline, cancel)
                    .await?;
                Some(Lease {
                    backend: backend.clone(),
                    holder,
                })
            }
            None => None,
        };

        tracing::debug!(
            resource = %self.resource,
            shared = lease.is_some(),
            wait_ms = started.elapsed().as_millis() as u64,
            "lock acquired"
        );

        Ok(LockGuard {
            resource: self.resource.clone(),
            lease,
            _local: local,
        })
    }

    async fn acquire_lease(
        &self,
        backend: &dyn LockBackend,
        holder: &str,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if backend
                .try_acquire(&self.resource, holder, self.options.lease)
                .await?
            {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    resource = %self.resource,
                    backend = backend.name(),
                    "gave up waiting for shared lease"
                );
                return Err(Error::LockTimeout(self.resource.clone()));
            }

            let wake = now
                .checked_add(self.options.retry_interval)
                .map_or(deadline, |t| t.min(deadline));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }
}

struct Lease {
    backend: Arc<dyn LockBackend>,
    holder: String,
}

/// Proof of holding a [`DistributedLock`].
///
/// Call [`unlock`](Self::unlock) when the critical section ends.  Dropping
/// the guard instead (e.g. when the owning future is cancelled) releases the
/// local mutex at once and the shared lease on a background task.
#[must_use = "the lock is released when the guard is unlocked or dropped"]
pub struct LockGuard {
    resource: String,
    lease: Option<Lease>,
    _local: OwnedMutexGuard<()>,
}

impl LockGuard {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Release the shared lease, then the local mutex.
    ///
    /// Release failures are logged and swallowed: the critical section has
    /// already completed, and a stuck lease lapses at its deadline.
    pub async fn unlock(mut self) {
        if let Some(lease) = self.lease.take() {
            if let Err(e) = lease.backend.release(&self.resource, &lease.holder).await {
                tracing::warn!(
                    resource = %self.resource,
                    backend = lease.backend.name(),
                    error = %e,
                    "failed to release shared lease; it will lapse at its deadline"
                );
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        let resource = std::mem::take(&mut self.resource);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(resource = %resource, "lock guard dropped; releasing lease in background");
                handle.spawn(async move {
                    if let Err(e) = lease.backend.release(&resource, &lease.holder).await {
                        tracing::warn!(
                            resource = %resource,
                            backend = lease.backend.name(),
                            error = %e,
                            "failed to release dropped lease; it will lapse at its deadline"
                        );
                    }
                });
            }
            Err(_) => tracing::warn!(
                resource = %resource,
                "lock guard dropped outside a runtime; shared lease left to lapse"
            ),
        }
    }
}
