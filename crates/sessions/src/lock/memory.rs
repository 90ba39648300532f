//! In-memory lease table.
//!
//! Several [`LockManager`](super::LockManager)s sharing one
//! `MemoryLeaseBackend` behave like separate processes sharing a lease
//! service, which is how the cross-instance tests exercise the lock.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use mk_domain::error::{Error, Result};
use mk_domain::trace::TraceEvent;

use super::LockBackend;

struct Held {
    holder: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryLeaseBackend {
    leases: Mutex<HashMap<String, Held>>,
}

impl MemoryLeaseBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holder of `resource`, if its lease is unexpired.
    pub fn holder(&self, resource: &str) -> Option<String> {
        let leases = self.leases.lock();
        leases
            .get(resource)
            .filter(|h| h.expires_at > Instant::now())
            .map(|h| h.holder.clone())
    }
}

#[async_trait]
impl LockBackend for MemoryLeaseBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn try_acquire(&self, resource: &str, holder: &str, lease: Duration) -> Result<bool> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(lease)
            .ok_or_else(|| Error::Lock(format!("lease of {lease:?} overflows the clock")))?;
        let mut leases = self.leases.lock();

        if let Some(current) = leases.get(resource) {
            if current.holder != holder {
                if current.expires_at > now {
                    return Ok(false);
                }
                TraceEvent::LockTakeover {
                    resource: resource.to_owned(),
                    previous_holder: current.holder.clone(),
                }
                .emit();
            }
        }

        leases.insert(
            resource.to_owned(),
            Held {
                holder: holder.to_owned(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn release(&self, resource: &str, holder: &str) -> Result<()> {
        let mut leases = self.leases.lock();
        if leases.get(resource).is_some_and(|h| h.holder == holder) {
            leases.remove(resource);
        }
        Ok(())
    }
}
