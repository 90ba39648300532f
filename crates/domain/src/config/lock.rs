use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Distributed lock
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// `file` (default) shares leases with every process using `dir`,
    /// including one-shot CLI commands.  `local` runs single-instance: only
    /// the in-process mutex is taken.
    #[serde(default)]
    pub backend: LockBackendKind,
    /// Shared lease directory for the `file` backend.
    #[serde(default = "d_dir")]
    pub dir: PathBuf,
    /// Resource name guarding the identity record map.
    #[serde(default = "d_resource")]
    pub resource: String,
    /// Lease lifetime.  Bounds how long a crashed holder can block others.
    #[serde(default = "d_lease_secs")]
    pub lease_secs: u64,
    /// How long `lock` waits for a contended lease before giving up.
    #[serde(default = "d_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "d_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackendKind::default(),
            dir: d_dir(),
            resource: d_resource(),
            lease_secs: d_lease_secs(),
            acquire_timeout_secs: d_acquire_timeout_secs(),
            retry_interval_ms: d_retry_interval_ms(),
        }
    }
}

impl LockConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockBackendKind {
    Local,
    /// Lease files in a directory shared by every instance.
    #[default]
    File,
}

fn d_dir() -> PathBuf {
    PathBuf::from("./data/locks")
}
fn d_resource() -> String {
    "identities".into()
}
fn d_lease_secs() -> u64 {
    300
}
fn d_acquire_timeout_secs() -> u64 {
    30
}
fn d_retry_interval_ms() -> u64 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lease_is_five_minutes() {
        let cfg = LockConfig::default();
        assert_eq!(cfg.lease(), Duration::from_secs(300));
        assert_eq!(cfg.backend, LockBackendKind::File);
        assert_eq!(cfg.resource, "identities");
    }

    #[test]
    fn file_backend_parses() {
        let toml_str = r#"
            backend = "file"
            dir = "/var/lib/memberkit/locks"
            retry_interval_ms = 10
        "#;
        let cfg: LockConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.backend, LockBackendKind::File);
        assert_eq!(cfg.dir, PathBuf::from("/var/lib/memberkit/locks"));
        assert_eq!(cfg.retry_interval(), Duration::from_millis(10));
        assert_eq!(cfg.acquire_timeout(), Duration::from_secs(30));
    }
}
