//! Lease files in a shared directory.
//!
//! Each resource has `<dir>/<resource>.lease` holding the current holder and
//! the lease deadline as JSON.  Reading and rewriting the lease happens under
//! an `fs2` exclusive lock on `<dir>/<resource>.guard`, so the check-and-set
//! is atomic across every process that can see the directory.  The guard is
//! only held for that short check; the lease file is what outlives a crash,
//! and it does so only until its deadline.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use mk_domain::error::{Error, Result};
use mk_domain::trace::TraceEvent;

use super::LockBackend;

#[derive(Debug, Serialize, Deserialize)]
struct LeaseRecord {
    holder: String,
    expires_at: DateTime<Utc>,
}

pub struct FileLeaseBackend {
    dir: PathBuf,
}

impl FileLeaseBackend {
    /// Use `dir` for lease files, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::info!(dir = %dir.display(), "file lease backend ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn paths(&self, resource: &str) -> (PathBuf, PathBuf) {
        let stem = file_stem(resource);
        (
            self.dir.join(format!("{stem}.guard")),
            self.dir.join(format!("{stem}.lease")),
        )
    }
}

#[async_trait]
impl LockBackend for FileLeaseBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn try_acquire(&self, resource: &str, holder: &str, lease: Duration) -> Result<bool> {
        let (guard_path, lease_path) = self.paths(resource);
        let dir = self.dir.clone();
        let holder = holder.to_owned();
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| Error::Lock(format!("lease duration: {e}")))?;

        let previous = tokio::task::spawn_blocking(move || {
            with_guard(&guard_path, || {
                let now = Utc::now();
                let expires_at = now
                    .checked_add_signed(lease)
                    .ok_or_else(|| Error::Lock("lease overflows the clock".into()))?;
                let previous = match read_lease(&lease_path)? {
                    Some(current) if current.holder != holder && current.expires_at > now => {
                        return Ok(Attempt::Busy);
                    }
                    Some(current) if current.holder != holder => Some(current.holder),
                    _ => None,
                };
                write_lease(
                    &dir,
                    &lease_path,
                    &LeaseRecord {
                        holder,
                        expires_at,
                    },
                )?;
                Ok(Attempt::Taken { previous })
            })
        })
        .await
        .map_err(|e| Error::Lock(format!("lease task: {e}")))??;

        match previous {
            Attempt::Busy => Ok(false),
            Attempt::Taken { previous } => {
                if let Some(previous_holder) = previous {
                    TraceEvent::LockTakeover {
                        resource: resource.to_owned(),
                        previous_holder,
                    }
                    .emit();
                }
                Ok(true)
            }
        }
    }

    async fn release(&self, resource: &str, holder: &str) -> Result<()> {
        let (guard_path, lease_path) = self.paths(resource);
        let holder = holder.to_owned();

        tokio::task::spawn_blocking(move || {
            with_guard(&guard_path, || {
                match read_lease(&lease_path)? {
                    Some(current) if current.holder == holder => {
                        fs::remove_file(&lease_path)?;
                    }
                    _ => {
                        tracing::debug!(
                            path = %lease_path.display(),
                            "lease no longer ours at release; leaving it"
                        );
                    }
                }
                Ok(())
            })
        })
        .await
        .map_err(|e| Error::Lock(format!("lease task: {e}")))?
    }
}

enum Attempt {
    Busy,
    Taken { previous: Option<String> },
}

/// Run `f` while holding an exclusive advisory lock on `guard_path`.
fn with_guard<T>(guard_path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let guard = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(guard_path)?;
    guard.lock_exclusive()?;
    let out = f();
    if let Err(e) = guard.unlock() {
        tracing::warn!(path = %guard_path.display(), error = %e, "failed to unlock lease guard");
    }
    out
}

fn read_lease(path: &Path) -> Result<Option<LeaseRecord>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_slice(&raw) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            // Only a torn write can produce this; the guard makes the lease free.
            tracing::warn!(path = %path.display(), error = %e, "unreadable lease file, treating as free");
            Ok(None)
        }
    }
}

fn write_lease(dir: &Path, path: &Path, record: &LeaseRecord) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&serde_json::to_vec(record)?)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Map a resource name to a safe file stem.
fn file_stem(resource: &str) -> String {
    resource
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_refuse_release() {
        let dir = tempfile::tempdir().unwrap();
        let b = FileLeaseBackend::new(dir.path()).unwrap();
        let lease = Duration::from_secs(60);

        assert!(b.try_acquire("identities", "a", lease).await.unwrap());
        assert!(dir.path().join("identities.lease").exists());
        assert!(!b.try_acquire("identities", "b", lease).await.unwrap());

        b.release("identities", "a").await.unwrap();
        assert!(!dir.path().join("identities.lease").exists());
        assert!(b.try_acquire("identities", "b", lease).await.unwrap());
    }

    #[tokio::test]
    async fn two_backends_on_one_directory_exclude_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let a = FileLeaseBackend::new(dir.path()).unwrap();
        let b = FileLeaseBackend::new(dir.path()).unwrap();
        let lease = Duration::from_secs(60);

        assert!(a.try_acquire("r", "a", lease).await.unwrap());
        assert!(!b.try_acquire("r", "b", lease).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lease_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let b = FileLeaseBackend::new(dir.path()).unwrap();

        assert!(b.try_acquire("r", "a", Duration::from_millis(10)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(b.try_acquire("r", "b", Duration::from_secs(60)).await.unwrap());

        // The crashed holder's late release must not free b's lease.
        b.release("r", "a").await.unwrap();
        assert!(!b.try_acquire("r", "c", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_lease_is_treated_as_free() {
        let dir = tempfile::tempdir().unwrap();
        let b = FileLeaseBackend::new(dir.path()).unwrap();
        fs::write(dir.path().join("r.lease"), b"{not json").unwrap();
        assert!(b.try_acquire("r", "a", Duration::from_secs(60)).await.unwrap());
    }

    #[test]
    fn resource_names_are_sanitized() {
        assert_eq!(file_stem("identities"), "identities");
        assert_eq!(file_stem("../etc/passwd"), ".._etc_passwd");
        assert_eq!(file_stem("a b:c"), "a_b_c");
    }
}
