use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Object storage for the identity record blob
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory for the `fs` backend.
    #[serde(default = "d_root")]
    pub root: PathBuf,
    /// Well-known key of the identity record blob.
    #[serde(default = "d_identities_key")]
    pub identities_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: d_root(),
            identities_key: d_identities_key(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process memory.  Records vanish on restart.
    Memory,
    /// One file per key under `root`.
    #[default]
    Fs,
}

fn d_root() -> PathBuf {
    PathBuf::from("./data")
}
fn d_identities_key() -> String {
    "identities.json".into()
}
