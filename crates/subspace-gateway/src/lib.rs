//! subspace-gateway
//!
//! Per-request authentication for the Subspace web UI. Each guarded route is
//! wrapped in [`require_session`], which either dispatches to the handler with a
//! [`Principal`](subspace_api::Principal) attached or redirects to sign-in or
//! first-run configuration.

mod access_log;
mod error;
mod gateway;
mod middleware;

pub use access_log::log_requests;
pub use error::GatewayError;
pub use gateway::{Decision, Gateway, GatewaySettings, Section, cookie_options};
pub use middleware::{Authenticated, Guard, require_session};
