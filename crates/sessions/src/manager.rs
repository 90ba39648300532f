//! Session store facade: the operations HTTP-facing collaborators use.

use chrono::{DateTime, Duration, Utc};
use http::header::{HeaderMap, AUTHORIZATION};
use rand::rngs::OsRng;
use rand::RngCore;
use tokio_util::sync::CancellationToken;

use mk_domain::config::CookieConfig;
use mk_domain::error::{Error, Result};
use mk_domain::session::{Identity, Session, SessionId};
use mk_domain::trace::TraceEvent;

use crate::cookie::{find_cookie, SessionCookie};
use crate::identity::IdentityStore;
use crate::secret::Secret;
use crate::token;

/// Mints, signs, reads and revokes sessions.
///
/// Built once at startup from an explicit [`Secret`], cookie settings and
/// an [`IdentityStore`], then shared behind an `Arc`.
pub struct SessionManager {
    secret: Secret,
    cookie: CookieConfig,
    session_ttl: Duration,
    identities: IdentityStore,
}

impl SessionManager {
    /// Fails with [`Error::InvalidSecret`] for unusable key material.
    pub fn new(
        secret: Secret,
        cookie: CookieConfig,
        session_ttl: Duration,
        identities: IdentityStore,
    ) -> Result<Self> {
        secret.validate()?;
        Ok(Self {
            secret,
            cookie,
            session_ttl,
            identities,
        })
    }

    pub fn identities(&self) -> &IdentityStore {
        &self.identities
    }

    pub fn cookie_config(&self) -> &CookieConfig {
        &self.cookie
    }

    /// Mint a session with a fresh random id.  Nothing is persisted or
    /// encoded.
    pub fn new_session(&self, expires: DateTime<Utc>) -> Session {
        let session = Session {
            id: SessionId(OsRng.next_u64()),
            expires,
        };
        TraceEvent::SessionMinted {
            session_id: session.id.to_string(),
            expires_at: expires.to_rfc3339(),
        }
        .emit();
        session
    }

    pub fn encode(&self, session: &Session) -> Result<String> {
        token::encode(&self.secret, session)
    }

    pub fn decode(&self, token: &str) -> Result<Session> {
        token::decode(&self.secret, token)
    }

    /// Extract and verify the session a request carries.
    ///
    /// `Authorization: Bearer <token>` wins over the session cookie; the
    /// cookie is only consulted when no bearer credential is present.
    pub fn read_session_from_request(&self, headers: &HeaderMap) -> Result<Session> {
        let (raw, source) = match bearer_token(headers) {
            Some(t) => (t, "bearer"),
            None => match find_cookie(headers, &self.cookie.name) {
                Some(c) if !c.is_empty() => (c, "cookie"),
                _ => return Err(Error::SessionNotFound),
            },
        };

        self.decode(raw).inspect_err(|e| {
            TraceEvent::SessionRejected {
                reason: e.to_string(),
                source: source.into(),
            }
            .emit();
        })
    }

    /// Resolve the identity behind the request's session.
    ///
    /// A correctly signed, unexpired token whose record was revoked yields
    /// [`Error::SessionNotFound`].
    pub async fn read_identity_from_request(
        &self,
        cancel: &CancellationToken,
        headers: &HeaderMap,
    ) -> Result<Identity> {
        let session = self.read_session_from_request(headers)?;
        self.identities.get_identity(cancel, session.id).await
    }

    /// Cookie carrying `session`'s token, expiring exactly when it does.
    pub fn new_cookie(&self, session: &Session) -> Result<SessionCookie> {
        let value = self.encode(session)?;
        Ok(SessionCookie::new(&self.cookie, value, session.expires))
    }

    /// Cookie that clears the client's credential.
    pub fn removal_cookie(&self) -> SessionCookie {
        SessionCookie::removal(&self.cookie)
    }

    pub async fn store_identity(
        &self,
        cancel: &CancellationToken,
        id: SessionId,
        identity: Identity,
    ) -> Result<()> {
        self.identities.store_identity(cancel, id, identity).await
    }

    /// Delete the identity record behind `id`.  Outstanding tokens stay
    /// well-formed but no longer resolve.
    pub async fn revoke(&self, cancel: &CancellationToken, id: SessionId) -> Result<()> {
        self.identities.delete_identity(cancel, id).await
    }

    /// Complete a login: mint a session with the configured lifetime,
    /// record `identity` against it and return the cookie to set.
    pub async fn login(
        &self,
        cancel: &CancellationToken,
        identity: Identity,
    ) -> Result<(Session, SessionCookie)> {
        let expires = Utc::now()
            .checked_add_signed(self.session_ttl)
            .ok_or_else(|| Error::Config("session ttl overflows the clock".into()))?;
        let session = self.new_session(expires);
        let cookie = self.new_cookie(&session)?;
        self.identities
            .store_identity(cancel, session.id, identity)
            .await?;
        Ok((session, cookie))
    }
}

/// Token from `Authorization: Bearer <token>`, if that header is present.
/// The scheme name is case-insensitive.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}
