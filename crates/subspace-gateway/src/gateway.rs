use std::fmt;
use std::sync::Arc;

use axum_extra::extract::cookie::CookieJar;
use http::request::Parts;
use subspace_api::{FederatedClaim, FederationClient, IdentityStore, Installation, Principal};
use subspace_auth::{CookieOptions, SessionArtifact, SessionManager, SessionRecord, build_clear_cookie};
use subspace_core::GatewayConfig;
use tracing::{debug, info, warn};

use crate::error::GatewayError;

/// The part of the site a request targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    SignIn,
    Forgot,
    Configure,
    Protected(&'static str),
}

impl Section {
    /// Entry points reachable without a session.
    pub fn is_entry(&self) -> bool {
        matches!(self, Section::SignIn | Section::Forgot | Section::Configure)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::SignIn => f.write_str("signin"),
            Section::Forgot => f.write_str("forgot"),
            Section::Configure => f.write_str("configure"),
            Section::Protected(name) => f.write_str(name),
        }
    }
}

/// Outcome of authenticating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Run the handler. `set_cookies` go on its response.
    Dispatch {
        principal: Option<Principal>,
        set_cookies: Vec<String>,
    },
    /// Skip the handler and send the client elsewhere.
    Redirect {
        location: String,
        set_cookies: Vec<String>,
    },
}

impl Decision {
    fn dispatch(principal: Option<Principal>) -> Self {
        Decision::Dispatch {
            principal,
            set_cookies: Vec::new(),
        }
    }

    fn redirect(location: &str) -> Self {
        Decision::Redirect {
            location: location.to_string(),
            set_cookies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub signin_path: String,
    pub configure_path: String,
    /// Bridge cookie cleared on sign-out when federation is configured.
    pub sso_cookie: CookieOptions,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            signin_path: "/signin".to_string(),
            configure_path: "/configure".to_string(),
            sso_cookie: CookieOptions::default().renamed("__subspace_sso_session"),
        }
    }
}

impl GatewaySettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            signin_path: config.routes.signin.clone(),
            configure_path: config.routes.configure.clone(),
            sso_cookie: cookie_options(config).renamed(config.session.sso_cookie_name.clone()),
        }
    }
}

/// Session cookie attributes for the configured host.
pub fn cookie_options(config: &GatewayConfig) -> CookieOptions {
    CookieOptions {
        name: config.session.cookie_name.clone(),
        domain: Some(config.http_host.clone()),
        secure: config.secure_cookies,
        ..CookieOptions::default()
    }
}

/// Decides, per request, whether the handler runs and as whom.
pub struct Gateway {
    sessions: SessionManager,
    identities: Arc<dyn IdentityStore>,
    installation: Arc<dyn Installation>,
    federation: Option<Arc<dyn FederationClient>>,
    settings: GatewaySettings,
}

impl Gateway {
    pub fn new(
        sessions: SessionManager,
        identities: Arc<dyn IdentityStore>,
        installation: Arc<dyn Installation>,
    ) -> Self {
        let settings = GatewaySettings {
            sso_cookie: sessions.cookie_options().renamed("__subspace_sso_session"),
            ..GatewaySettings::default()
        };
        Self {
            sessions,
            identities,
            installation,
            federation: None,
            settings,
        }
    }

    #[must_use]
    pub fn with_federation(mut self, client: Arc<dyn FederationClient>) -> Self {
        self.federation = Some(client);
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: GatewaySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Display name of the configured identity provider, if any.
    pub fn sso_provider_name(&self) -> Option<String> {
        self.federation.as_ref().map(|f| f.provider_name())
    }

    pub async fn authenticate(
        &self,
        section: &Section,
        request: &Parts,
    ) -> Result<Decision, GatewayError> {
        if section.is_entry() {
            return Ok(Decision::dispatch(None));
        }

        if !self.installation.is_configured() {
            return Ok(Decision::redirect(&self.settings.configure_path));
        }

        let jar = CookieJar::from_headers(&request.headers);
        let token = jar.get(self.sessions.cookie_name()).map(|c| c.value());
        match self.sessions.validate(token) {
            Ok(record) => return self.local_session(section, record).await,
            Err(e) if e.is_session_rejection() => {
                debug!(section = %section, error = %e, "no valid local session");
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(federation) = &self.federation {
            match federation.resolve(request).await {
                FederatedClaim::Absent => {}
                FederatedClaim::Malformed(detail) => {
                    return Err(GatewayError::MalformedFederationClaim(detail));
                }
                FederatedClaim::Verified { subject_email } => {
                    if subject_email.trim().is_empty() {
                        return Err(GatewayError::MalformedFederationClaim(
                            "federated session carries no email".to_string(),
                        ));
                    }
                    return self.federated_session(&subject_email).await;
                }
            }
        }

        warn!(section = %section, "sign in required");
        Ok(Decision::redirect(&self.settings.signin_path))
    }

    async fn local_session(
        &self,
        section: &Section,
        record: SessionRecord,
    ) -> Result<Decision, GatewayError> {
        if record.user_id.is_empty() {
            return Ok(Decision::dispatch(Some(Principal::admin_only(record.is_admin))));
        }

        match self.identities.find_by_id(&record.user_id).await {
            Ok(identity) => Ok(Decision::dispatch(Some(Principal::from_identity(identity)))),
            Err(e) => {
                warn!(
                    section = %section,
                    user_id = %record.user_id,
                    error = %e,
                    "session user unavailable, forcing sign out"
                );
                Ok(Decision::Redirect {
                    location: self.settings.signin_path.clone(),
                    set_cookies: self.sign_out()?,
                })
            }
        }
    }

    async fn federated_session(&self, email: &str) -> Result<Decision, GatewayError> {
        let identity = match self.identities.find_by_email(email).await {
            Ok(identity) => identity,
            Err(e) if e.is_not_found() => {
                let identity = self.identities.create(email).await?;
                info!(user_id = %identity.id, email = %email, "provisioned federated user");
                identity
            }
            Err(e) => return Err(e.into()),
        };

        let artifact = self.sign_in(identity.is_admin, &identity.id)?;
        info!(user_id = %identity.id, is_admin = identity.is_admin, "federated sign in");
        Ok(Decision::Dispatch {
            principal: Some(Principal::from_identity(identity)),
            set_cookies: vec![artifact.set_cookie],
        })
    }

    /// Issue a session for a caller whose credentials were checked elsewhere.
    pub fn sign_in(&self, is_admin: bool, user_id: &str) -> Result<SessionArtifact, GatewayError> {
        Ok(self.sessions.issue(is_admin, user_id)?)
    }

    /// `Set-Cookie` values that end the caller's session.
    pub fn sign_out(&self) -> Result<Vec<String>, GatewayError> {
        let mut cookies = vec![self.sessions.revoke()?.set_cookie];
        if self.federation.is_some() {
            cookies.push(build_clear_cookie(&self.settings.sso_cookie));
        }
        Ok(cookies)
    }
}
