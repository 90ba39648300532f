//! Session and identity core for Memberkit.
//!
//! Turns a completed login into a signed, replayable token and keeps the
//! server-side record of what that token may do.
//!
//! - [`secret`]: signing key material
//! - [`token`]: the session token codec
//! - [`lock`]: process-local plus shared-lease mutual exclusion
//! - [`objects`]: the key/value storage contract
//! - [`identity`]: the lock-protected session id → identity map
//! - [`manager`]: the facade HTTP collaborators call

pub mod cookie;
pub mod identity;
pub mod lock;
pub mod manager;
pub mod objects;
pub mod secret;
pub mod token;

pub use cookie::SessionCookie;
pub use identity::IdentityStore;
pub use lock::{DistributedLock, LockBackend, LockGuard, LockManager, LockOptions};
pub use manager::SessionManager;
pub use objects::{FsObjectStore, MemoryObjectStore, ObjectStore};
pub use secret::Secret;
