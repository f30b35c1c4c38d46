//! axum glue around [`Gateway`].

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRequestParts, OptionalFromRequestParts, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::{LOCATION, SET_COOKIE};
use http::request::Parts;
use http::{HeaderValue, StatusCode};
use subspace_api::Principal;

use crate::error::GatewayError;
use crate::gateway::{Decision, Gateway, Section};

/// Middleware state: the gateway plus the section the wrapped routes belong to.
#[derive(Clone)]
pub struct Guard {
    gateway: Arc<Gateway>,
    section: Section,
}

impl Guard {
    pub fn new(gateway: Arc<Gateway>, section: Section) -> Self {
        Self { gateway, section }
    }
}

/// Use with `axum::middleware::from_fn_with_state`.
pub async fn require_session(State(guard): State<Guard>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();

    let decision = match guard.gateway.authenticate(&guard.section, &parts).await {
        Ok(decision) => decision,
        Err(e) => return e.into_response(),
    };

    match decision {
        Decision::Redirect {
            location,
            set_cookies,
        } => {
            let mut response = (StatusCode::FOUND, [(LOCATION, location)]).into_response();
            append_cookies(&mut response, &set_cookies);
            response
        }
        Decision::Dispatch {
            principal,
            set_cookies,
        } => {
            if let Some(principal) = principal {
                parts.extensions.insert(principal);
            }
            let mut response = next.run(Request::from_parts(parts, body)).await;
            append_cookies(&mut response, &set_cookies);
            response
        }
    }
}

pub(crate) fn append_cookies(response: &mut Response, cookies: &[String]) {
    for cookie in cookies {
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => tracing::error!(error = %e, "dropping unencodable Set-Cookie value"),
        }
    }
}

/// The principal the gateway attached to this request.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(Authenticated)
            .ok_or(GatewayError::MissingPrincipal)
    }
}

impl<S> OptionalFromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Principal>().cloned().map(Authenticated))
    }
}
