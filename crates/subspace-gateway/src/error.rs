use axum::response::{Html, IntoResponse, Response};
use http::StatusCode;
use subspace_api::StoreError;

const ERROR_PAGE: &str = "<!doctype html>\n<html><head><title>Error</title></head>\
<body><h1>Something went wrong</h1><p>Please try again later.</p></body></html>\n";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("malformed federation claim: {0}")]
    MalformedFederationClaim(String),

    #[error("identity store failure: {0}")]
    IdentityStore(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] subspace_auth::Error),

    /// A handler asked for a principal on a route the gateway does not guard.
    #[error("no authenticated principal on request")]
    MissingPrincipal,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Html(ERROR_PAGE)).into_response()
    }
}
