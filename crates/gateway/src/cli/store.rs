//! One-shot commands against the configured identity store.

use anyhow::Context;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use mk_domain::config::{Config, LockBackendKind, StorageBackend};
use mk_domain::error::Error;
use mk_domain::session::SessionId;

use crate::bootstrap::{build_session_manager, load_secret};

/// Refuse to write through a process-local lock to storage a running
/// server may share: the server's mutex does not cover this process.
fn ensure_shared_lock(config: &Config) -> anyhow::Result<()> {
    if config.lock.backend == LockBackendKind::Local && config.storage.backend == StorageBackend::Fs {
        anyhow::bail!(
            "lock.backend = \"local\" only guards one process; set lock.backend = \"file\" \
             (shared with the server) before modifying {}",
            config.storage.root.join(&config.storage.identities_key).display()
        );
    }
    Ok(())
}

pub async fn init(config: &Config) -> anyhow::Result<()> {
    ensure_shared_lock(config)?;
    let manager = build_session_manager(config, load_secret(config)?)?;
    manager
        .identities()
        .init(&CancellationToken::new())
        .await
        .context("initializing identity store")?;
    println!("identity store ready ({})", manager.identities().key());
    Ok(())
}

/// Decode `token` and report what it carries.  Returns `false` when the
/// token does not verify.
pub async fn inspect(config: &Config, token: &str) -> anyhow::Result<bool> {
    let manager = build_session_manager(config, load_secret(config)?)?;

    let session = match manager.decode(token) {
        Ok(s) => s,
        Err(Error::SessionExpired(s)) => {
            println!("session:  {}", s.id);
            println!("expires:  {}", s.expires.to_rfc3339());
            println!("status:   expired");
            return Ok(false);
        }
        Err(e) => {
            println!("status:   {e}");
            return Ok(false);
        }
    };

    println!("session:  {}", session.id);
    println!("expires:  {}", session.expires.to_rfc3339());
    println!(
        "status:   valid ({} minutes left)",
        (session.expires - Utc::now()).num_minutes()
    );

    match manager
        .identities()
        .get_identity(&CancellationToken::new(), session.id)
        .await
    {
        Ok(identity) => {
            println!("kind:     {}", identity.kind);
            println!("roles:    {}", identity.roles.join(", "));
            if let Some(subject) = identity.subject {
                println!("subject:  {subject}");
            }
            Ok(true)
        }
        Err(Error::SessionNotFound) => {
            println!("identity: none (revoked or never stored)");
            Ok(false)
        }
        Err(e) => Err(e).context("reading identity store"),
    }
}

pub async fn revoke(config: &Config, session_id: &str) -> anyhow::Result<()> {
    let id: SessionId = session_id
        .parse()
        .with_context(|| format!("{session_id:?} is not a 16-digit hex session id"))?;
    ensure_shared_lock(config)?;
    let manager = build_session_manager(config, load_secret(config)?)?;
    manager
        .revoke(&CancellationToken::new(), id)
        .await
        .context("revoking session")?;
    println!("revoked {id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_fs() -> Config {
        let mut config = Config::default();
        config.lock.backend = LockBackendKind::Local;
        config
    }

    #[test]
    fn local_lock_over_fs_storage_is_refused() {
        let err = ensure_shared_lock(&local_fs()).unwrap_err();
        assert!(err.to_string().contains("lock.backend"));
    }

    #[test]
    fn shared_or_in_memory_setups_are_allowed() {
        ensure_shared_lock(&Config::default()).unwrap();

        let mut memory = local_fs();
        memory.storage.backend = StorageBackend::Memory;
        ensure_shared_lock(&memory).unwrap();
    }

    #[tokio::test]
    async fn revoke_refuses_before_touching_storage() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = local_fs();
        config.storage.root = dir.path().join("objects");

        assert!(revoke(&config, "00000000000000ff").await.is_err());
        assert!(init(&config).await.is_err());
        assert!(!dir.path().join("objects").exists());
    }
}
