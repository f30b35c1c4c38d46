//! Error types.

use thiserror::Error;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The request carried no session token.
    #[error("no session")]
    NoSession,

    /// Token is malformed, its tag does not verify, or the payload has the wrong shape.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The session window has not opened yet.
    #[error("session not yet valid")]
    SessionNotYetValid,

    /// The session window has closed.
    #[error("session expired")]
    SessionExpired,

    /// Encoding a token failed. Never caused by caller input.
    #[error("token codec failure: {0}")]
    CodecFailure(String),

    /// The shared secret cannot be used.
    #[error("invalid secret: {0}")]
    InvalidSecret(String),
}

impl Error {
    /// True for the kinds that only mean "this request has no usable session".
    pub fn is_session_rejection(&self) -> bool {
        matches!(
            self,
            Error::NoSession
                | Error::InvalidToken(_)
                | Error::SessionNotYetValid
                | Error::SessionExpired
        )
    }
}
