//! Identity verification for the websocket handshake and bearer routes.
//!
//! ARCHITECTURE
//! ============
//! Tokens are issued elsewhere; this service only checks them. The engine
//! depends on the [`TokenVerifier`] trait so tests can swap in fixed
//! identities. [`JwtVerifier`] is the production implementation: an HS256
//! signature and expiry check with no I/O, so it never blocks.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("token missing")]
    Missing,
    #[error("token expired")]
    Expired,
    #[error("token rejected: {0}")]
    Rejected(String),
    #[error("token carries no user id")]
    MissingUserId,
}

/// Validate an opaque bearer token and return the user it identifies.
pub trait TokenVerifier: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`VerifyError`] describing why the token was rejected.
    fn verify(&self, token: &str) -> Result<String, VerifyError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(rename = "userId", default)]
    user_id: Option<String>,
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self { key: DecodingKey::from_secret(secret), validation: Validation::new(Algorithm::HS256) }
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<String, VerifyError> {
        if token.is_empty() {
            return Err(VerifyError::Missing);
        }

        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => VerifyError::Expired,
            _ => VerifyError::Rejected(e.to_string()),
        })?;

        data.claims
            .user_id
            .filter(|id| !id.is_empty())
            .ok_or(VerifyError::MissingUserId)
    }
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
