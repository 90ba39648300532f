//! Session token codec.
//!
//! Wire format: `mk1.` followed by six fields of exactly 16 lowercase hex
//! digits with no separators:
//!
//! ```text
//! mk1.<hash0><hash1><hash2><hash3><session id><expires, unix nanos>
//! ```
//!
//! `hash0..hash3` are the SHA-256 digest of
//! `secret || hex16(id) || hex16(expires)` read as four little-endian
//! 64-bit words.  The token signs an opaque id only; roles live in the
//! identity store.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use mk_domain::error::{Error, Result};
use mk_domain::session::{Session, SessionId};

use crate::secret::Secret;

/// Literal prefix of every token.
pub const TOKEN_PREFIX: &str = "mk1.";

const FIELD_LEN: usize = 16;
const FIELD_COUNT: usize = 6;

/// Total length of an encoded token.
pub const TOKEN_LEN: usize = TOKEN_PREFIX.len() + FIELD_LEN * FIELD_COUNT;

/// Encode and sign `session`.
///
/// A pure function of its inputs, so the same session always yields the
/// same token whether it travels in a header or a cookie.  Fails only for
/// an expiry outside the range representable as `i64` nanoseconds.
pub fn encode(secret: &Secret, session: &Session) -> Result<String> {
    let expires = expires_nanos(session.expires)?;
    let sig = signature(secret, session.id.0, expires);

    let mut out = String::with_capacity(TOKEN_LEN);
    out.push_str(TOKEN_PREFIX);
    for word in sig {
        push_hex16(&mut out, word);
    }
    push_hex16(&mut out, session.id.0);
    push_hex16(&mut out, expires as u64);
    Ok(out)
}

/// Decode and verify `token` against the current time.
pub fn decode(secret: &Secret, token: &str) -> Result<Session> {
    decode_at(secret, token, Utc::now())
}

/// Decode and verify `token`, treating `now` as the current time.
///
/// - malformed or wrongly signed → [`Error::InvalidSession`]
/// - signed but `now >= expires` → [`Error::SessionExpired`] carrying the
///   parsed session
pub fn decode_at(secret: &Secret, token: &str, now: DateTime<Utc>) -> Result<Session> {
    let fields = token
        .strip_prefix(TOKEN_PREFIX)
        .filter(|rest| rest.len() == FIELD_LEN * FIELD_COUNT)
        .ok_or(Error::InvalidSession)?;

    let mut words = [0u64; FIELD_COUNT];
    for (word, field) in words.iter_mut().zip(fields.as_bytes().chunks_exact(FIELD_LEN)) {
        *word = parse_hex16(field)?;
    }

    let id = words[4];
    let expires = words[5] as i64;

    let claimed = words_to_bytes(&words[..4]);
    let expected = words_to_bytes(&signature(secret, id, expires));
    if !bool::from(claimed.ct_eq(&expected)) {
        return Err(Error::InvalidSession);
    }

    let session = Session {
        id: SessionId(id),
        expires: DateTime::from_timestamp_nanos(expires),
    };
    if session.is_expired_at(now) {
        return Err(Error::SessionExpired(session));
    }
    Ok(session)
}

fn signature(secret: &Secret, id: u64, expires: i64) -> [u64; 4] {
    let mut hasher = Sha256::new();
    hasher.update(secret.to_string().as_bytes());
    hasher.update(format!("{id:016x}").as_bytes());
    hasher.update(format!("{:016x}", expires as u64).as_bytes());
    let digest = hasher.finalize();

    let mut words = [0u64; 4];
    for (word, chunk) in words.iter_mut().zip(digest.chunks_exact(8)) {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        *word = u64::from_le_bytes(buf);
    }
    words
}

fn expires_nanos(expires: DateTime<Utc>) -> Result<i64> {
    expires.timestamp_nanos_opt().ok_or(Error::InvalidSession)
}

fn words_to_bytes(words: &[u64]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (chunk, word) in out.chunks_exact_mut(8).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    out
}

fn push_hex16(out: &mut String, value: u64) {
    use std::fmt::Write;
    // Writing into a String cannot fail.
    let _ = write!(out, "{value:016x}");
}

/// Strict field parser: exactly 16 bytes of `[0-9a-f]`.  Uppercase is
/// rejected so that every accepted token has exactly one spelling.  Works on
/// bytes so non-ASCII input is rejected rather than split mid-character.
fn parse_hex16(field: &[u8]) -> Result<u64> {
    if field.len() != FIELD_LEN {
        return Err(Error::InvalidSession);
    }
    field.iter().try_fold(0u64, |acc, &b| {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            _ => return Err(Error::InvalidSession),
        };
        Ok((acc << 4) | u64::from(digit))
    })
}
