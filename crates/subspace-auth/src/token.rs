//! Tamper-evident token codec.
//!
//! Tokens are compact HS256 JWS values. The signing key is derived per channel
//! (`HMAC-SHA256(secret, context || name)`), so a token minted for one channel never
//! verifies on another even though both share the process secret.

use crate::{Error, Result};

use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

const CHANNEL_KEY_CONTEXT: &[u8] = b"subspace-token-v1:";

/// Process-wide signing secret. Immutable once constructed.
#[derive(Clone)]
pub struct SharedSecret(Arc<[u8]>);

impl SharedSecret {
    /// Wrap raw secret bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_SECRET_LEN {
            return Err(Error::InvalidSecret(format!(
                "secret must be at least {MIN_SECRET_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(Arc::from(bytes)))
    }

    /// Parse a hex encoded secret.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| Error::InvalidSecret(format!("secret is not valid hex: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Generate a fresh random 64-byte secret.
    pub fn generate() -> Self {
        let mut buf = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut buf);
        Self(Arc::from(&buf[..]))
    }

    /// Hex encoding, for writing into configuration.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Encodes and decodes signed tokens bound to a named channel.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    secret: SharedSecret,
}

impl TokenCodec {
    pub fn new(secret: SharedSecret) -> Self {
        Self { secret }
    }

    /// Encode `payload` for channel `name`.
    pub fn encode<T: Serialize>(&self, name: &str, payload: &T) -> Result<String> {
        let key = EncodingKey::from_secret(&self.channel_key(name)?);
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), payload, &key)
            .map_err(|e| Error::CodecFailure(e.to_string()))
    }

    /// Decode a token previously encoded for channel `name`.
    ///
    /// Any failure (bad framing, tag mismatch, wrong channel, wrong payload shape)
    /// is reported as [`Error::InvalidToken`].
    pub fn decode<T: DeserializeOwned>(&self, name: &str, token: &str) -> Result<T> {
        if token.is_empty() {
            return Err(Error::InvalidToken("empty token".to_string()));
        }
        let key = DecodingKey::from_secret(&self.channel_key(name)?);
        jsonwebtoken::decode::<T>(token, &key, &integrity_only())
            .map(|data| data.claims)
            .map_err(|e| Error::InvalidToken(e.to_string()))
    }

    fn channel_key(&self, name: &str) -> Result<Vec<u8>> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.secret.0)
            .map_err(|e| Error::InvalidSecret(e.to_string()))?;
        mac.update(CHANNEL_KEY_CONTEXT);
        mac.update(name.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

// Time windows are enforced by the session layer, not here.
fn integrity_only() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation
}
