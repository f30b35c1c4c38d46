//! subspace-auth
//!
//! Local session primitives for the Subspace web gateway:
//!
//! - **Token codec**: signed, channel-bound tokens over a shared secret
//! - **Session manager**: issue / validate / revoke stateless 12-hour sessions
//! - **Cookie builder**: host-scoped, HTTP-only `Set-Cookie` values
//!
//! ## Quick start
//! ```
//! use subspace_auth::{CookieOptions, SessionManager, SharedSecret, TokenCodec};
//!
//! let codec = TokenCodec::new(SharedSecret::generate());
//! let sessions = SessionManager::new(codec, CookieOptions::default());
//!
//! let artifact = sessions.issue(false, "user-1").unwrap();
//! let record = sessions.validate(Some(&artifact.token)).unwrap();
//! assert_eq!(record.user_id, "user-1");
//! ```

#![forbid(unsafe_code)]

mod cookie;
mod error;
mod session;
mod token;

pub use cookie::{
    CookieOptions, SameSite, build_clear_cookie, build_expired_cookie, build_set_cookie,
};
pub use error::{Error, Result};
pub use session::{SESSION_TTL, SessionArtifact, SessionManager, SessionRecord};
pub use token::{MIN_SECRET_LEN, SharedSecret, TokenCodec};
