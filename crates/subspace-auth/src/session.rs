//! Stateless local sessions.

use crate::cookie::{CookieOptions, build_expired_cookie, build_set_cookie};
use crate::token::TokenCodec;
use crate::{Error, Result};

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Lifetime of every issued session.
pub const SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Window used by revocation tokens; closed long before any `now`.
const REVOKED_AT: Duration = Duration::from_secs(1);

/// Data carried inside a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionRecord {
    /// Admin flag. Authoritative only when `user_id` is empty.
    #[serde(rename = "adm")]
    pub is_admin: bool,
    /// Empty for admin-only sessions.
    #[serde(rename = "uid")]
    pub user_id: String,
    /// Start of the validity window, whole seconds.
    #[serde(rename = "nbf", with = "epoch_seconds")]
    pub not_before: SystemTime,
    /// End of the validity window, inclusive.
    #[serde(rename = "exp", with = "epoch_seconds")]
    pub not_after: SystemTime,
}

/// A token plus the `Set-Cookie` value that transports it.
#[derive(Debug, Clone)]
pub struct SessionArtifact {
    /// What the token carries.
    pub record: SessionRecord,

    /// Signed token, the cookie value.
    pub token: String,

    /// Full `Set-Cookie` header value.
    pub set_cookie: String,
}

/// Issues, validates and revokes session tokens.
#[derive(Debug, Clone)]
pub struct SessionManager {
    codec: TokenCodec,
    cookie: CookieOptions,
}

impl SessionManager {
    /// Create a manager. `cookie.name` doubles as the token channel.
    pub fn new(codec: TokenCodec, cookie: CookieOptions) -> Self {
        Self { codec, cookie }
    }

    /// Cookie (and token channel) name.
    pub fn cookie_name(&self) -> &str {
        &self.cookie.name
    }

    /// Attributes used for every session cookie.
    pub fn cookie_options(&self) -> &CookieOptions {
        &self.cookie
    }

    /// Issue a 12-hour session starting now. `user_id` is empty for admin-only sessions.
    pub fn issue(&self, is_admin: bool, user_id: &str) -> Result<SessionArtifact> {
        self.issue_at(is_admin, user_id, SystemTime::now())
    }

    /// Issue a session whose window opens at `now`.
    pub fn issue_at(&self, is_admin: bool, user_id: &str, now: SystemTime) -> Result<SessionArtifact> {
        let not_before = whole_seconds(now);
        let record = SessionRecord {
            is_admin,
            user_id: user_id.to_string(),
            not_before,
            not_after: not_before + SESSION_TTL,
        };
        let token = self.codec.encode(&self.cookie.name, &record)?;
        let set_cookie = build_set_cookie(&token, &self.cookie, Some(record.not_after));
        Ok(SessionArtifact {
            record,
            token,
            set_cookie,
        })
    }

    /// Validate a presented token against the current time.
    ///
    /// Returns [`Error::NoSession`] when nothing was presented, [`Error::InvalidToken`]
    /// when it does not decode, and [`Error::SessionNotYetValid`] or
    /// [`Error::SessionExpired`] when `now` is outside the window.
    pub fn validate(&self, token: Option<&str>) -> Result<SessionRecord> {
        self.validate_at(token, SystemTime::now())
    }

    /// Validate a presented token against the clock reading `now`.
    pub fn validate_at(&self, token: Option<&str>, now: SystemTime) -> Result<SessionRecord> {
        let token = token.filter(|t| !t.is_empty()).ok_or(Error::NoSession)?;
        let record: SessionRecord = self.codec.decode(&self.cookie.name, token)?;
        if now < record.not_before {
            return Err(Error::SessionNotYetValid);
        }
        if now > record.not_after {
            return Err(Error::SessionExpired);
        }
        Ok(record)
    }

    /// Replacement artifact whose window has already closed.
    ///
    /// There is no revocation list; this only overwrites the client's copy.
    pub fn revoke(&self) -> Result<SessionArtifact> {
        let closed = UNIX_EPOCH + REVOKED_AT;
        let record = SessionRecord {
            is_admin: false,
            user_id: String::new(),
            not_before: closed,
            not_after: closed,
        };
        let token = self.codec.encode(&self.cookie.name, &record)?;
        let set_cookie = build_expired_cookie(&token, &self.cookie);
        Ok(SessionArtifact {
            record,
            token,
            set_cookie,
        })
    }
}

fn whole_seconds(t: SystemTime) -> SystemTime {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => UNIX_EPOCH + Duration::from_secs(d.as_secs()),
        Err(_) => t,
    }
}

mod epoch_seconds {
    use serde::{Deserialize, Deserializer, Serializer, de, ser};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
        let secs = t
            .duration_since(UNIX_EPOCH)
            .map_err(ser::Error::custom)?
            .as_secs();
        s.serialize_u64(secs)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SystemTime, D::Error> {
        let secs = u64::deserialize(d)?;
        UNIX_EPOCH
            .checked_add(Duration::from_secs(secs))
            .ok_or_else(|| de::Error::custom("timestamp out of range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::SharedSecret;

    fn manager() -> SessionManager {
        let codec = TokenCodec::new(SharedSecret::from_bytes(&[42u8; 32]).unwrap());
        let cookie = CookieOptions {
            domain: Some("vpn.example.com".to_string()),
            ..CookieOptions::default()
        };
        SessionManager::new(codec, cookie)
    }

    #[test]
    fn issued_session_validates_immediately() {
        let m = manager();
        for (admin, uid) in [(true, ""), (false, "u-1"), (true, "u-2")] {
            let artifact = m.issue(admin, uid).unwrap();
            let record = m.validate(Some(&artifact.token)).unwrap();
            assert_eq!(record.is_admin, admin);
            assert_eq!(record.user_id, uid);
            assert_eq!(record, artifact.record);
        }
    }

    #[test]
    fn window_is_twelve_hours() {
        let artifact = manager().issue(false, "u").unwrap();
        let r = artifact.record;
        assert_eq!(r.not_after.duration_since(r.not_before).unwrap(), SESSION_TTL);
        assert!(artifact.set_cookie.starts_with("__subspace_session="));
        assert!(artifact.set_cookie.contains("HttpOnly"));
        assert!(artifact.set_cookie.contains("Domain=vpn.example.com"));
        assert!(artifact.set_cookie.contains("Expires="));
    }

    #[test]
    fn missing_token_is_no_session() {
        let m = manager();
        assert!(matches!(m.validate(None), Err(Error::NoSession)));
        assert!(matches!(m.validate(Some("")), Err(Error::NoSession)));
    }

    #[test]
    fn elapsed_window_is_expired() {
        let m = manager();
        let issued = SystemTime::now() - SESSION_TTL - Duration::from_secs(60);
        let artifact = m.issue_at(false, "u", issued).unwrap();
        assert!(matches!(
            m.validate(Some(&artifact.token)),
            Err(Error::SessionExpired)
        ));
    }

    #[test]
    fn future_window_is_not_yet_valid() {
        let m = manager();
        let now = SystemTime::now();
        let artifact = m.issue_at(false, "u", now + Duration::from_secs(3600)).unwrap();
        assert!(matches!(
            m.validate_at(Some(&artifact.token), now),
            Err(Error::SessionNotYetValid)
        ));
    }

    #[test]
    fn boundaries_are_inclusive() {
        let m = manager();
        let now = whole_seconds(SystemTime::now());
        let artifact = m.issue_at(true, "", now).unwrap();
        assert!(m.validate_at(Some(&artifact.token), now).is_ok());
        assert!(m.validate_at(Some(&artifact.token), now + SESSION_TTL).is_ok());
        assert!(matches!(
            m.validate_at(Some(&artifact.token), now + SESSION_TTL + Duration::from_secs(1)),
            Err(Error::SessionExpired)
        ));
    }

    #[test]
    fn revoked_artifact_is_expired() {
        let m = manager();
        let revoked = m.revoke().unwrap();
        assert!(matches!(
            m.validate(Some(&revoked.token)),
            Err(Error::SessionExpired)
        ));
        assert!(revoked.set_cookie.contains("Max-Age=0"));
    }

    #[test]
    fn tampered_tag_is_invalid_token() {
        let m = manager();
        let token = m.issue(true, "u").unwrap().token;
        let (head, sig) = token.rsplit_once('.').unwrap();
        let mut sig: Vec<char> = sig.chars().collect();
        let i = sig.len() / 2;
        sig[i] = if sig[i] == 'x' { 'y' } else { 'x' };
        let tampered = format!("{head}.{}", sig.into_iter().collect::<String>());
        assert!(matches!(
            m.validate(Some(&tampered)),
            Err(Error::InvalidToken(_))
        ));
    }

    #[test]
    fn token_from_other_channel_is_invalid() {
        let m = manager();
        let token = m.issue(false, "u").unwrap().token;
        let sso = SessionManager::new(
            TokenCodec::new(SharedSecret::from_bytes(&[42u8; 32]).unwrap()),
            m.cookie_options().renamed("__subspace_sso_session"),
        );
        assert!(matches!(
            sso.validate(Some(&token)),
            Err(Error::InvalidToken(_))
        ));
    }

    #[test]
    fn record_wire_names() {
        let record = SessionRecord {
            is_admin: true,
            user_id: "u".into(),
            not_before: UNIX_EPOCH + Duration::from_secs(10),
            not_after: UNIX_EPOCH + Duration::from_secs(20),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"adm": true, "uid": "u", "nbf": 10, "exp": 20})
        );
    }
}
