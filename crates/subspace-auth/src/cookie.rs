//! Cookie helpers.

use httpdate::fmt_http_date;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// SameSite attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// SameSite=Strict
    Strict,
    /// SameSite=Lax
    Lax,
    /// SameSite=None
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Options used to build a session cookie.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    /// Cookie name. Also the token channel name.
    pub name: String,

    /// Cookie path.
    pub path: String,

    /// Host the cookie is scoped to.
    pub domain: Option<String>,

    /// Send on HTTPS only.
    pub secure: bool,

    /// Not accessible to JS.
    pub http_only: bool,

    /// SameSite attribute.
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            name: "__subspace_session".to_string(),
            path: "/".to_string(),
            domain: None,
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }
}

impl CookieOptions {
    /// Same attributes under a different name.
    #[must_use]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

fn attributes(value: &str, opts: &CookieOptions) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    parts.push(format!("{}={value}", opts.name));
    parts.push(format!("Path={}", opts.path));

    if let Some(domain) = &opts.domain {
        parts.push(format!("Domain={domain}"));
    }

    if opts.secure {
        parts.push("Secure".to_string());
    }
    if opts.http_only {
        parts.push("HttpOnly".to_string());
    }

    parts.push(format!("SameSite={}", opts.same_site.as_str()));
    parts
}

/// Build a `Set-Cookie` header value expiring at `expires` (session cookie if `None`).
pub fn build_set_cookie(value: &str, opts: &CookieOptions, expires: Option<SystemTime>) -> String {
    let mut parts = attributes(value, opts);
    if let Some(expires) = expires {
        parts.push(format!("Expires={}", fmt_http_date(expires)));
    }
    parts.join("; ")
}

/// Build a `Set-Cookie` header value that carries `value` but is already expired.
pub fn build_expired_cookie(value: &str, opts: &CookieOptions) -> String {
    let mut parts = attributes(value, opts);
    parts.push("Max-Age=0".to_string());
    parts.push(format!(
        "Expires={}",
        fmt_http_date(UNIX_EPOCH + Duration::from_secs(1))
    ));
    parts.join("; ")
}

/// Build a `Set-Cookie` header value that clears the cookie.
pub fn build_clear_cookie(opts: &CookieOptions) -> String {
    build_expired_cookie("", opts)
}
