use async_trait::async_trait;
use http::request::Parts;
use serde::{Deserialize, Serialize};
use url::Url;

pub type UserId = String;
pub type Email = String;

/// A user known to the identity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub email: Email,
    pub is_admin: bool,
}

/// The caller attached to a request once authentication succeeded.
///
/// Admin-only sessions carry no backing identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub is_admin: bool,
    pub identity: Option<Identity>,
}

impl Principal {
    pub fn admin_only(is_admin: bool) -> Self {
        Self {
            is_admin,
            identity: None,
        }
    }

    pub fn from_identity(identity: Identity) -> Self {
        Self {
            is_admin: identity.is_admin,
            identity: Some(identity),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.id.as_str())
    }

    pub fn email(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.email.as_str())
    }
}

/// What the federation client found on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FederatedClaim {
    /// No federated session accompanies the request.
    Absent,
    /// A session the client already verified at the protocol level.
    Verified { subject_email: Email },
    /// A federated session exists but does not have the expected shape.
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Identity, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Identity, StoreError>;
    async fn create(&self, email: &str) -> Result<Identity, StoreError>;
}

#[async_trait]
pub trait FederationClient: Send + Sync {
    /// Return the verified federated session bound to this request, if any.
    async fn resolve(&self, request: &Parts) -> FederatedClaim;

    /// Identity provider endpoint for the HTTP-Redirect binding.
    fn redirect_binding_url(&self) -> Option<Url>;

    /// Human readable provider name for sign-in pages.
    fn provider_name(&self) -> String {
        provider_display_name(self.redirect_binding_url().as_ref())
    }
}

/// Whether first-run configuration has completed.
pub trait Installation: Send + Sync {
    fn is_configured(&self) -> bool;
}

pub trait SecretStore: Send + Sync {
    fn get(&self, secret_ref: &str) -> Result<String, StoreError>;
}

/// Derive a display name from the identity provider's SSO URL.
///
/// `https://login.okta.com/app/sso` becomes `Okta`. Returns `"unknown"` when the
/// URL has no usable domain.
pub fn provider_display_name(url: Option<&Url>) -> String {
    let Some(url) = url else {
        return String::new();
    };
    match url.domain().and_then(registrable_label) {
        Some(label) => capitalize(&label),
        None => "unknown".to_string(),
    }
}

fn registrable_label(host: &str) -> Option<String> {
    let host = host.trim_end_matches('.').to_lowercase();
    let domain = psl::domain_str(&host)?;
    domain.split('.').next().map(str::to_string)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
