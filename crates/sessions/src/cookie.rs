//! Session cookie rendering and request-cookie lookup.

use std::fmt;

use chrono::{DateTime, Utc};
use http::header::{HeaderMap, HeaderValue, COOKIE};

use mk_domain::config::{CookieConfig, SameSite};
use mk_domain::error::{Error, Result};

/// A `Set-Cookie` value carrying a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: String,
    /// Always the session's own expiry, never an independent lifetime.
    pub expires: DateTime<Utc>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl SessionCookie {
    pub fn new(config: &CookieConfig, value: String, expires: DateTime<Utc>) -> Self {
        Self {
            name: config.name.clone(),
            value,
            domain: config.domain.clone(),
            path: config.path.clone(),
            expires,
            http_only: config.http_only,
            secure: config.secure,
            same_site: config.same_site,
        }
    }

    /// An empty, already-expired cookie that makes the client drop its
    /// credential.
    pub fn removal(config: &CookieConfig) -> Self {
        Self::new(config, String::new(), DateTime::UNIX_EPOCH)
    }

    pub fn to_header_value(&self) -> Result<HeaderValue> {
        HeaderValue::from_str(&self.to_string())
            .map_err(|e| Error::Config(format!("cookie header: {e}")))
    }
}

impl fmt::Display for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        write!(f, "; Path={}", self.path)?;
        write!(
            f,
            "; Expires={}",
            self.expires.format("%a, %d %b %Y %H:%M:%S GMT")
        )?;
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        write!(f, "; SameSite={}", self.same_site.as_str())
    }
}

/// Value of the first cookie called `name` across all `Cookie` headers.
pub fn find_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> CookieConfig {
        CookieConfig {
            domain: Some("members.example.org".into()),
            ..CookieConfig::default()
        }
    }

    #[test]
    fn renders_all_attributes() {
        let expires = Utc.with_ymd_and_hms(2031, 3, 9, 7, 5, 1).unwrap();
        let cookie = SessionCookie::new(&config(), "mk1.abc".into(), expires);
        assert_eq!(
            cookie.to_string(),
            "mk_session=mk1.abc; Domain=members.example.org; Path=/; \
             Expires=Sun, 09 Mar 2031 07:05:01 GMT; HttpOnly; Secure; SameSite=Lax"
        );
        cookie.to_header_value().unwrap();
    }

    #[test]
    fn removal_is_expired_and_empty() {
        let cookie = SessionCookie::removal(&CookieConfig::default());
        assert!(cookie.value.is_empty());
        assert!(cookie.expires < Utc::now());
        assert!(cookie.to_string().contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
    }

    #[test]
    fn finds_cookie_among_several() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; mk_session=tok1"));
        headers.append(COOKIE, HeaderValue::from_static("mk_session=tok2"));
        assert_eq!(find_cookie(&headers, "mk_session"), Some("tok1"));
        assert_eq!(find_cookie(&headers, "theme"), Some("dark"));
        assert_eq!(find_cookie(&headers, "missing"), None);
    }

    #[test]
    fn name_match_is_exact() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("xmk_session=nope"));
        assert_eq!(find_cookie(&headers, "mk_session"), None);
    }
}
