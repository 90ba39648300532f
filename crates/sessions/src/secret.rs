//! Session signing secret.
//!
//! 256 bits held as four 64-bit words.  The canonical text form is each word
//! as 16 lowercase hex digits, concatenated (64 characters).  That form is
//! both the configuration format and the first input of the token signature.

use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::RngCore;

use mk_domain::error::{Error, Result};

/// Number of hex characters in the canonical encoding.
pub const SECRET_HEX_LEN: usize = 64;

/// Server-side symmetric key material.  Immutable once constructed.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Secret([u64; 4]);

impl Secret {
    pub fn from_words(words: [u64; 4]) -> Self {
        Self(words)
    }

    /// Draw a fresh secret from the OS random source.
    pub fn generate() -> Self {
        let mut words = [0u64; 4];
        for w in &mut words {
            *w = OsRng.next_u64();
        }
        Self(words)
    }

    pub fn words(&self) -> [u64; 4] {
        self.0
    }

    /// Reject key material with any zero word.  An unset or defaulted
    /// configuration value ends up here rather than signing tokens.
    pub fn validate(&self) -> Result<()> {
        if self.0.iter().any(|w| *w == 0) {
            return Err(Error::InvalidSecret);
        }
        Ok(())
    }

    /// Read, decode and validate the secret held in environment variable `var`.
    pub fn from_env(var: &str) -> Result<Self> {
        let raw = std::env::var(var).map_err(|_| {
            tracing::error!(env = %var, "session secret env var is unset");
            Error::InvalidSecret
        })?;
        let secret: Secret = raw.trim().parse()?;
        secret.validate()?;
        Ok(secret)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for w in &self.0 {
            write!(f, "{w:016x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

impl FromStr for Secret {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // Lowercase only, like token fields: one spelling per secret.
        if s.len() != SECRET_HEX_LEN
            || !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(Error::InvalidSecret);
        }
        let bytes = hex::decode(s).map_err(|_| Error::InvalidSecret)?;
        let mut words = [0u64; 4];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            *word = u64::from_be_bytes(buf);
        }
        Ok(Self(words))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: &str = "0123456789abcdeffedcba98765432100000000000000001ffffffffffffffff";

    #[test]
    fn generated_secret_validates() {
        let s = Secret::generate();
        s.validate().unwrap();
        assert_eq!(s.to_string().len(), SECRET_HEX_LEN);
    }

    #[test]
    fn any_zero_word_is_invalid() {
        for i in 0..4 {
            let mut words = [1u64, 2, 3, 4];
            words[i] = 0;
            assert!(matches!(
                Secret::from_words(words).validate(),
                Err(Error::InvalidSecret)
            ));
        }
        Secret::from_words([1, 2, 3, 4]).validate().unwrap();
    }

    #[test]
    fn decodes_known_encoding() {
        let s: Secret = KNOWN.parse().unwrap();
        assert_eq!(
            s.words(),
            [0x0123_4567_89ab_cdef, 0xfedc_ba98_7654_3210, 1, u64::MAX]
        );
        assert_eq!(s.to_string(), KNOWN);
    }

    #[test]
    fn rejects_uppercase_and_bad_width() {
        assert!(matches!(
            KNOWN.to_uppercase().parse::<Secret>(),
            Err(Error::InvalidSecret)
        ));
        assert!(matches!(KNOWN[1..].parse::<Secret>(), Err(Error::InvalidSecret)));
        let non_hex = format!("{}g", &KNOWN[1..]);
        assert!(matches!(non_hex.parse::<Secret>(), Err(Error::InvalidSecret)));
    }

    #[test]
    fn round_trips_generated() {
        for _ in 0..16 {
            let s = Secret::generate();
            assert_eq!(s.to_string().parse::<Secret>().unwrap(), s);
        }
    }

    #[test]
    fn small_words_are_zero_padded() {
        let s = Secret::from_words([1, 2, 3, 4]);
        assert_eq!(
            s.to_string(),
            "0000000000000001000000000000000200000000000000030000000000000004"
        );
    }

    #[test]
    fn rejects_wrong_width() {
        assert!(KNOWN[..63].parse::<Secret>().is_err());
        assert!(format!("{KNOWN}0").parse::<Secret>().is_err());
        assert!("".parse::<Secret>().is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let bad = format!("{}g", &KNOWN[..63]);
        assert!(matches!(bad.parse::<Secret>(), Err(Error::InvalidSecret)));
    }

    #[test]
    fn debug_hides_key_material() {
        let s: Secret = KNOWN.parse().unwrap();
        assert_eq!(format!("{s:?}"), "Secret(..)");
    }
}
