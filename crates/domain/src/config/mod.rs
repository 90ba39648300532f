mod auth;
mod lock;
mod observability;
mod server;
mod storage;

pub use auth::*;
pub use lock::*;
pub use observability::*;
pub use server::*;
pub use storage::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process-wide configuration.  Loaded once at startup and handed to
/// constructors; nothing reads it from a global.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

/// Ten years; longer expiries approach the end of the token's nanosecond
/// clock (year 2262).
pub const MAX_SESSION_TTL_HOURS: u32 = 24 * 3653;
pub const MAX_LEASE_SECS: u64 = 24 * 60 * 60;
pub const MAX_ACQUIRE_TIMEOUT_SECS: u64 = 60 * 60;
pub const MAX_RETRY_INTERVAL_MS: u64 = 60 * 1000;

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.  The session secret
    /// is not checked here; it lives in the environment and is validated
    /// when the session manager is built.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }

        if self.auth.secret_env.is_empty() {
            errors.push(ConfigError::error(
                "auth.secret_env",
                "secret_env must name an environment variable",
            ));
        }
        if self.auth.session_ttl_hours == 0 {
            errors.push(ConfigError::error(
                "auth.session_ttl_hours",
                "sessions would expire immediately",
            ));
        }
        if self.auth.session_ttl_hours > MAX_SESSION_TTL_HOURS {
            errors.push(ConfigError::error(
                "auth.session_ttl_hours",
                format!("session_ttl_hours must be at most {MAX_SESSION_TTL_HOURS}"),
            ));
        }

        let cookie = &self.auth.cookie;
        if cookie.name.is_empty()
            || cookie
                .name
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '=' | ';' | ','))
        {
            errors.push(ConfigError::error(
                "auth.cookie.name",
                "cookie name must be a non-empty token without '=', ';', ',' or spaces",
            ));
        }
        if !cookie.path.starts_with('/') {
            errors.push(ConfigError::error("auth.cookie.path", "path must start with '/'"));
        }
        if !cookie.secure {
            errors.push(ConfigError::warning(
                "auth.cookie.secure",
                "session cookie will be sent over plain HTTP",
            ));
        }
        if cookie.same_site == SameSite::None && !cookie.secure {
            errors.push(ConfigError::error(
                "auth.cookie.same_site",
                "browsers reject SameSite=None without Secure",
            ));
        }

        if self.storage.identities_key.is_empty() {
            errors.push(ConfigError::error(
                "storage.identities_key",
                "identities_key must not be empty",
            ));
        }

        if self.lock.resource.is_empty() {
            errors.push(ConfigError::error("lock.resource", "resource must not be empty"));
        }
        if self.lock.lease_secs == 0 {
            errors.push(ConfigError::error(
                "lock.lease_secs",
                "a zero lease expires before the critical section runs",
            ));
        }
        if self.lock.lease_secs > MAX_LEASE_SECS {
            errors.push(ConfigError::error(
                "lock.lease_secs",
                format!("lease_secs must be at most {MAX_LEASE_SECS}"),
            ));
        }
        if self.lock.acquire_timeout_secs == 0 {
            errors.push(ConfigError::error(
                "lock.acquire_timeout_secs",
                "acquire timeout must be greater than 0",
            ));
        }
        if self.lock.acquire_timeout_secs > MAX_ACQUIRE_TIMEOUT_SECS {
            errors.push(ConfigError::error(
                "lock.acquire_timeout_secs",
                format!("acquire_timeout_secs must be at most {MAX_ACQUIRE_TIMEOUT_SECS}"),
            ));
        }
        if self.lock.retry_interval_ms > MAX_RETRY_INTERVAL_MS {
            errors.push(ConfigError::error(
                "lock.retry_interval_ms",
                format!("retry_interval_ms must be at most {MAX_RETRY_INTERVAL_MS}"),
            ));
        }
        if self.lock.retry_interval_ms == 0 {
            errors.push(ConfigError::warning(
                "lock.retry_interval_ms",
                "zero retry interval busy-polls the lease backend",
            ));
        }
        if self.lock.backend == LockBackendKind::File && self.storage.backend == StorageBackend::Memory {
            errors.push(ConfigError::warning(
                "lock.backend",
                "shared file lock guards process-local memory storage",
            ));
        }
        if self.lock.backend == LockBackendKind::Local && self.storage.backend == StorageBackend::Fs {
            errors.push(ConfigError::warning(
                "lock.backend",
                "single-instance mode: run only one process against this storage root",
            ));
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError::error(
                "observability.sample_rate",
                "sample_rate must be between 0.0 and 1.0",
            ));
        }

        errors
    }
}
