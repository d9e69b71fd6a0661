//! Token codec: signs and verifies session credentials.
//!
//! Tokens are HS512 JWTs signed with a per-session secret supplied by the
//! caller. The codec itself holds no keys; it only knows the clock.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::clock::Clock;

/// Issuer stamped into every token.
pub const ISSUER: &str = "farerpath";

/// Refresh token duration: 30 days, independent of the session duration.
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Which flow a token is allowed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    /// Short-lived, cache-gated.
    Auth,
    /// Long-lived, store-gated. Only used to mint new auth tokens.
    Refresh,
}

/// Claims carried by both token types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Random correlation value shared by a session's auth and refresh tokens.
    /// Not a key.
    #[serde(rename = "secretHandle")]
    pub secret_handle: String,
    #[serde(rename = "tokenType")]
    pub token_type: TokenType,
    /// Unique token ID, so re-signing within the same second never repeats a token
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
    pub iss: String,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("token signature does not match")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
}

#[derive(Clone)]
pub struct TokenCodec {
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Sign a token of `token_type` that expires `duration_secs` from now.
    pub fn sign(
        &self,
        secret_handle: &str,
        token_type: TokenType,
        duration_secs: u64,
        signing_secret: &str,
    ) -> Result<String, CodecError> {
        let now = self.clock.now();
        // Round up so the token never lapses before a cache entry with the same TTL
        let expires = now.saturating_add(Duration::from_secs(duration_secs));
        let exp = expires.as_secs() + u64::from(expires.subsec_nanos() != 0);

        let claims = Claims {
            secret_handle: secret_handle.to_string(),
            token_type,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now.as_secs(),
            exp,
            iss: ISSUER.to_string(),
        };

        jsonwebtoken::encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(signing_secret.as_bytes()),
        )
        .map_err(CodecError::Encoding)
    }

    /// Check the signature against `signing_secret`, then the claims.
    ///
    /// Expiry is checked against the injected clock rather than by
    /// `jsonwebtoken`, after the signature has been verified.
    pub fn verify(&self, token: &str, signing_secret: &str) -> Result<Claims, CodecError> {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        let data = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(signing_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => CodecError::InvalidSignature,
            ErrorKind::ExpiredSignature => CodecError::Expired,
            _ => CodecError::Malformed,
        })?;

        if self.clock.now_secs() >= data.claims.exp {
            return Err(CodecError::Expired);
        }

        Ok(data.claims)
    }
}
