//! Session manager and AppState construction shared by `serve` and the
//! one-shot store commands.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use mk_domain::config::{Config, ConfigSeverity, LockBackendKind, StorageBackend};
use mk_sessions::lock::FileLeaseBackend;
use mk_sessions::{
    FsObjectStore, IdentityStore, LockManager, LockOptions, MemoryObjectStore, ObjectStore,
    Secret, SessionManager,
};

use crate::state::AppState;

/// Read the session secret from the environment variable named in config.
/// Any failure here is a deployment defect and stops startup.
pub fn load_secret(config: &Config) -> anyhow::Result<Secret> {
    Secret::from_env(&config.auth.secret_env).with_context(|| {
        format!(
            "{} must hold a 64-digit hex secret with no zero word \
             (generate one with `memberkit secret generate`)",
            config.auth.secret_env
        )
    })
}

/// Wire object storage, the lock and the identity store into a
/// [`SessionManager`] according to `config`.
pub fn build_session_manager(config: &Config, secret: Secret) -> anyhow::Result<SessionManager> {
    let objects: Arc<dyn ObjectStore> = match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("memory storage: identity records are lost on restart");
            Arc::new(MemoryObjectStore::new())
        }
        StorageBackend::Fs => Arc::new(
            FsObjectStore::new(&config.storage.root)
                .with_context(|| format!("opening storage root {}", config.storage.root.display()))?,
        ),
    };

    let options = LockOptions::from(&config.lock);
    let locks = match config.lock.backend {
        LockBackendKind::Local => {
            tracing::info!("lock backend: local (single-instance mode)");
            LockManager::local(options)
        }
        LockBackendKind::File => {
            let backend = FileLeaseBackend::new(&config.lock.dir)
                .with_context(|| format!("opening lock dir {}", config.lock.dir.display()))?;
            tracing::info!(
                dir = %config.lock.dir.display(),
                lease_secs = config.lock.lease_secs,
                "lock backend: file leases"
            );
            LockManager::shared(Arc::new(backend), options)
        }
    };

    let identities = IdentityStore::new(
        objects,
        locks.lock_for(&config.lock.resource),
        config.storage.identities_key.clone(),
    );

    SessionManager::new(
        secret,
        config.auth.cookie.clone(),
        config.auth.session_ttl(),
        identities,
    )
    .context("building session manager")
}

/// Validate config, resolve the secret, build the session manager and make
/// sure the identity blob exists.
pub async fn build_app_state(
    config: Arc<Config>,
    shutdown: CancellationToken,
) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let error_count = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if error_count > 0 {
        anyhow::bail!("config validation failed with {error_count} error(s)");
    }

    // ── Session core ─────────────────────────────────────────────────
    let secret = load_secret(&config)?;
    let sessions = build_session_manager(&config, secret)?;
    sessions
        .identities()
        .init(&shutdown)
        .await
        .context("initializing identity store")?;
    tracing::info!(key = %sessions.identities().key(), "identity store ready");

    Ok(AppState {
        config,
        sessions: Arc::new(sessions),
        shutdown,
    })
}
