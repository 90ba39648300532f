use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Auth: session secret, lifetime and cookie shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable holding the 64-hex-digit session secret.
    /// The secret itself is never written to the config file.  A missing
    /// or invalid secret is fatal at startup.
    #[serde(default = "d_secret_env")]
    pub secret_env: String,

    /// Lifetime of a freshly minted session, in hours.
    #[serde(default = "d_session_ttl_hours")]
    pub session_ttl_hours: u32,

    #[serde(default)]
    pub cookie: CookieConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_env: d_secret_env(),
            session_ttl_hours: d_session_ttl_hours(),
            cookie: CookieConfig::default(),
        }
    }
}

impl AuthConfig {
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.session_ttl_hours))
    }
}

/// Attributes of the session cookie.  The cookie value and its `Expires`
/// always come from the session itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    #[serde(default = "d_cookie_name")]
    pub name: String,
    /// `Domain` attribute.  `None` scopes the cookie to the request host.
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default = "d_cookie_path")]
    pub path: String,
    #[serde(default = "d_true")]
    pub http_only: bool,
    #[serde(default = "d_true")]
    pub secure: bool,
    #[serde(default)]
    pub same_site: SameSite,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: d_cookie_name(),
            domain: None,
            path: d_cookie_path(),
            http_only: true,
            secure: true,
            same_site: SameSite::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

fn d_secret_env() -> String {
    "MK_SESSION_SECRET".into()
}
fn d_session_ttl_hours() -> u32 {
    24 * 14
}
fn d_cookie_name() -> String {
    "mk_session".into()
}
fn d_cookie_path() -> String {
    "/".into()
}
fn d_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let cfg: AuthConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.secret_env, "MK_SESSION_SECRET");
        assert_eq!(cfg.session_ttl_hours, 336);
        assert_eq!(cfg.cookie.name, "mk_session");
        assert_eq!(cfg.cookie.path, "/");
        assert!(cfg.cookie.http_only);
        assert!(cfg.cookie.secure);
        assert_eq!(cfg.cookie.same_site, SameSite::Lax);
        assert!(cfg.cookie.domain.is_none());
    }

    #[test]
    fn cookie_section_parses() {
        let toml_str = r#"
            session_ttl_hours = 1

            [cookie]
            name = "member"
            domain = "example.org"
            same_site = "strict"
        "#;
        let cfg: AuthConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.session_ttl(), chrono::Duration::hours(1));
        assert_eq!(cfg.cookie.name, "member");
        assert_eq!(cfg.cookie.domain.as_deref(), Some("example.org"));
        assert_eq!(cfg.cookie.same_site.as_str(), "Strict");
    }
}
