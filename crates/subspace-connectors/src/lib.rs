use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum_extra::extract::cookie::CookieJar;
use http::request::Parts;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subspace_api::{
    FederatedClaim, FederationClient, Identity, IdentityStore, Installation, SecretStore,
    StoreError, UserId,
};
use subspace_auth::{CookieOptions, TokenCodec, build_set_cookie};
use url::Url;

/// Lifetime of a federation bridge session.
pub const BRIDGE_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get(&self, secret_ref: &str) -> Result<String, StoreError> {
        std::env::var(secret_ref)
            .map_err(|_| StoreError::NotFound(format!("missing secret env var {secret_ref}")))
    }
}

/// Identity store kept in process memory.
#[derive(Default)]
pub struct MemoryIdentityStore {
    users: RwLock<BTreeMap<UserId, Identity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user directly, bypassing the duplicate-email check.
    pub fn insert(&self, identity: Identity) -> Result<(), StoreError> {
        let mut guard = self
            .users
            .write()
            .map_err(|_| StoreError::Backend("identity store poisoned".to_string()))?;
        guard.insert(identity.id.clone(), identity);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<Option<Identity>, StoreError> {
        let mut guard = self
            .users
            .write()
            .map_err(|_| StoreError::Backend("identity store poisoned".to_string()))?;
        Ok(guard.remove(id))
    }

    pub fn len(&self) -> usize {
        self.users.read().map_or(0, |g| g.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_id(&self, id: &str) -> Result<Identity, StoreError> {
        let guard = self
            .users
            .read()
            .map_err(|_| StoreError::Backend("identity store poisoned".to_string()))?;
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    async fn find_by_email(&self, email: &str) -> Result<Identity, StoreError> {
        let guard = self
            .users
            .read()
            .map_err(|_| StoreError::Backend("identity store poisoned".to_string()))?;
        guard
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user with email {email}")))
    }

    async fn create(&self, email: &str) -> Result<Identity, StoreError> {
        let mut guard = self
            .users
            .write()
            .map_err(|_| StoreError::Backend("identity store poisoned".to_string()))?;
        if guard.values().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(StoreError::Conflict(format!("user with email {email} exists")));
        }
        let identity = Identity {
            id: random_id(),
            email: email.to_string(),
            is_admin: false,
        };
        guard.insert(identity.id.clone(), identity.clone());
        Ok(identity)
    }
}

fn random_id() -> String {
    let mut buf = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// First-run flag held in memory.
#[derive(Debug, Default)]
pub struct StaticInstallation {
    configured: AtomicBool,
}

impl StaticInstallation {
    pub fn new(configured: bool) -> Self {
        Self {
            configured: AtomicBool::new(configured),
        }
    }

    pub fn mark_configured(&self) {
        self.configured.store(true, Ordering::SeqCst);
    }
}

impl Installation for StaticInstallation {
    fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct BridgeClaims {
    sub: String,
    exp: u64,
}

/// Federation client backed by the SSO bridge cookie.
///
/// The assertion consumer verifies the identity provider's response and then calls
/// [`BridgeSessionClient::issue`]; subsequent requests carry the resulting cookie,
/// which is signed on its own token channel.
pub struct BridgeSessionClient {
    codec: TokenCodec,
    cookie: CookieOptions,
    idp_sso_url: Url,
}

impl BridgeSessionClient {
    pub fn new(codec: TokenCodec, cookie: CookieOptions, idp_sso_url: Url) -> Self {
        Self {
            codec,
            cookie,
            idp_sso_url,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie.name
    }

    /// `Set-Cookie` value carrying a bridge session for `subject_email`.
    ///
    /// Called by the assertion-consumer route once the identity provider's response
    /// has been verified. That route lives outside this workspace; `subspace serve`
    /// only reads the cookie.
    pub fn issue(&self, subject_email: &str) -> subspace_auth::Result<String> {
        let expires = SystemTime::now() + BRIDGE_SESSION_TTL;
        let claims = BridgeClaims {
            sub: subject_email.to_string(),
            exp: epoch_secs(expires),
        };
        let token = self.codec.encode(&self.cookie.name, &claims)?;
        Ok(build_set_cookie(&token, &self.cookie, Some(expires)))
    }
}

#[async_trait]
impl FederationClient for BridgeSessionClient {
    async fn resolve(&self, request: &Parts) -> FederatedClaim {
        let jar = CookieJar::from_headers(&request.headers);
        let Some(cookie) = jar.get(&self.cookie.name) else {
            return FederatedClaim::Absent;
        };

        let value: serde_json::Value = match self.codec.decode(&self.cookie.name, cookie.value()) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "SSO: unable to get session from request");
                return FederatedClaim::Absent;
            }
        };

        let claims: BridgeClaims = match serde_json::from_value(value) {
            Ok(claims) => claims,
            Err(e) => return FederatedClaim::Malformed(format!("unexpected claim shape: {e}")),
        };

        if claims.exp < epoch_secs(SystemTime::now()) {
            tracing::debug!("SSO: bridge session expired");
            return FederatedClaim::Absent;
        }

        FederatedClaim::Verified {
            subject_email: claims.sub,
        }
    }

    fn redirect_binding_url(&self) -> Option<Url> {
        Some(self.idp_sso_url.clone())
    }
}

fn epoch_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;
    use http::header::COOKIE;
    use subspace_auth::SharedSecret;

    fn bridge() -> BridgeSessionClient {
        BridgeSessionClient::new(
            TokenCodec::new(SharedSecret::from_bytes(&[9u8; 32]).unwrap()),
            CookieOptions::default().renamed("__subspace_sso_session"),
            Url::parse("https://login.okta.com/app/sso/saml").unwrap(),
        )
    }

    fn parts_with_cookie(cookie: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(c) = cookie {
            builder = builder.header(COOKIE, c);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn cookie_pair(set_cookie: &str) -> String {
        set_cookie.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn memory_store_create_and_find() {
        let store = MemoryIdentityStore::new();
        let created = store.create("a@example.com").await.unwrap();
        assert!(!created.is_admin);
        assert_eq!(store.find_by_id(&created.id).await.unwrap(), created);
        assert_eq!(store.find_by_email("A@example.com").await.unwrap(), created);
        assert!(matches!(
            store.create("a@example.com").await,
            Err(StoreError::Conflict(_))
        ));
        assert!(store.find_by_id("nope").await.unwrap_err().is_not_found());
        store.remove(&created.id).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn installation_flag() {
        let install = StaticInstallation::new(false);
        assert!(!install.is_configured());
        install.mark_configured();
        assert!(install.is_configured());
    }

    #[test]
    fn env_secret_store_missing_var() {
        let err = EnvSecretStore
            .get("SUBSPACE_TEST_SECRET_THAT_IS_NOT_SET")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn bridge_cookie_resolves_to_claim() {
        let client = bridge();
        let set_cookie = client.issue("user@example.com").unwrap();
        let parts = parts_with_cookie(Some(&cookie_pair(&set_cookie)));
        assert_eq!(
            client.resolve(&parts).await,
            FederatedClaim::Verified {
                subject_email: "user@example.com".to_string()
            }
        );
    }

    #[tokio::test]
    async fn no_or_foreign_cookie_is_absent() {
        let client = bridge();
        assert_eq!(client.resolve(&parts_with_cookie(None)).await, FederatedClaim::Absent);

        let other = BridgeSessionClient::new(
            TokenCodec::new(SharedSecret::from_bytes(&[10u8; 32]).unwrap()),
            CookieOptions::default().renamed("__subspace_sso_session"),
            Url::parse("https://login.okta.com/").unwrap(),
        );
        let forged = cookie_pair(&other.issue("evil@example.com").unwrap());
        assert_eq!(
            client.resolve(&parts_with_cookie(Some(&forged))).await,
            FederatedClaim::Absent
        );
    }

    #[tokio::test]
    async fn unexpected_shape_is_malformed() {
        let client = bridge();
        let token = client
            .codec
            .encode(
                "__subspace_sso_session",
                &serde_json::json!({"email": "user@example.com"}),
            )
            .unwrap();
        let parts = parts_with_cookie(Some(&format!("__subspace_sso_session={token}")));
        assert!(matches!(
            client.resolve(&parts).await,
            FederatedClaim::Malformed(_)
        ));
    }

    #[tokio::test]
    async fn expired_bridge_session_is_absent() {
        let client = bridge();
        let token = client
            .codec
            .encode(
                "__subspace_sso_session",
                &BridgeClaims {
                    sub: "user@example.com".to_string(),
                    exp: 1,
                },
            )
            .unwrap();
        let parts = parts_with_cookie(Some(&format!("__subspace_sso_session={token}")));
        assert_eq!(client.resolve(&parts).await, FederatedClaim::Absent);
    }

    #[test]
    fn provider_name_comes_from_sso_url() {
        assert_eq!(bridge().provider_name(), "Okta");
    }
}
