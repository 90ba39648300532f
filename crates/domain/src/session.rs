//! Session and identity data shared between the codec, the record store
//! and the HTTP-facing collaborators.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// 64-bit random session identifier.
///
/// Displays as exactly 16 lowercase hex digits, the same rendering the
/// token wire format uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = Error;

    /// Accepts the 16-digit hex rendering produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidSession);
        }
        u64::from_str_radix(s, 16)
            .map(SessionId)
            .map_err(|_| Error::InvalidSession)
    }
}

/// An opaque `(id, expiry)` pair identifying one login event.
///
/// Carries no role data: what the session may do lives server-side in the
/// identity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub expires: DateTime<Utc>,
}

impl Session {
    /// `true` when `now` is at or past the expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }
}

/// Server-side record of what a session is allowed to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// How the member authenticated (e.g. `"password"`, `"oidc"`).
    pub kind: String,
    pub roles: Vec<String>,
    /// Opaque external-subject reference, e.g. a federated user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl Identity {
    pub fn new(kind: impl Into<String>, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            kind: kind.into(),
            roles: roles.into_iter().map(Into::into).collect(),
            subject: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn session_id_renders_sixteen_hex_digits() {
        assert_eq!(SessionId(0xab).to_string(), "00000000000000ab");
        assert_eq!(SessionId(u64::MAX).to_string(), "ffffffffffffffff");
    }

    #[test]
    fn session_id_parses_own_rendering() {
        let id = SessionId(0x0123_4567_89ab_cdef);
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
    }

    #[test]
    fn session_id_rejects_bad_width() {
        assert!("abc".parse::<SessionId>().is_err());
        assert!("+123456789abcdef".parse::<SessionId>().is_err());
    }

    #[test]
    fn expiry_boundary_is_expired() {
        let now = Utc::now();
        let s = Session { id: SessionId(1), expires: now };
        assert!(s.is_expired_at(now));
        assert!(!s.is_expired_at(now - Duration::seconds(1)));
    }

    #[test]
    fn identity_omits_absent_subject() {
        let identity = Identity::new("password", ["member"]);
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "kind": "password", "roles": ["member"] })
        );
    }

    #[test]
    fn identity_keeps_subject_when_present() {
        let identity = Identity::new("oidc", ["member", "editor"]).with_subject("google:42");
        let back: Identity =
            serde_json::from_str(&serde_json::to_string(&identity).unwrap()).unwrap();
        assert_eq!(back, identity);
        assert!(back.has_role("editor"));
        assert!(!back.has_role("admin"));
    }
}
