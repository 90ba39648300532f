use crate::session::Session;

/// Shared error type used across all Memberkit crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Key material is unset, malformed or has a zero word.
    #[error("invalid secret")]
    InvalidSecret,

    /// Token is malformed or its signature does not match.  Corrupted and
    /// forged tokens are indistinguishable.
    #[error("invalid session")]
    InvalidSession,

    /// Token is well-formed and correctly signed but past its expiry.
    /// Carries the parsed session so callers can prompt a re-login.
    #[error("session expired at {}", .0.expires)]
    SessionExpired(Session),

    /// No credential was presented, or the credential references a record
    /// that does not exist.
    #[error("session not found")]
    SessionNotFound,

    #[error("storage: {0}")]
    Storage(String),

    #[error("lock: {0}")]
    Lock(String),

    #[error("timed out acquiring lock on {0}")]
    LockTimeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// `true` for the kinds a transport layer should report as
    /// "unauthenticated".  Everything else is an operational failure.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Error::InvalidSession | Error::SessionExpired(_) | Error::SessionNotFound
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionId;
    use chrono::Utc;

    #[test]
    fn unauthenticated_kinds() {
        let expired = Error::SessionExpired(Session {
            id: SessionId(7),
            expires: Utc::now(),
        });
        assert!(expired.is_unauthenticated());
        assert!(Error::InvalidSession.is_unauthenticated());
        assert!(Error::SessionNotFound.is_unauthenticated());
    }

    #[test]
    fn operational_kinds_are_not_unauthenticated() {
        assert!(!Error::Storage("bucket offline".into()).is_unauthenticated());
        assert!(!Error::LockTimeout("identities".into()).is_unauthenticated());
        assert!(!Error::Cancelled.is_unauthenticated());
        assert!(!Error::InvalidSecret.is_unauthenticated());
    }
}
