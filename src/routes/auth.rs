//! Bearer-token extractor for the REST routes.
//!
//! The websocket authenticates in-band with an `authenticate` frame; REST
//! callers present the same token as `Authorization: Bearer <token>` and it is
//! checked by the same verifier.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::debug;

use crate::state::AppState;

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated user extracted from the bearer token.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub user_id: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(StatusCode::UNAUTHORIZED)?;
        let app_state = AppState::from_ref(state);
        let user_id = app_state.verifier.verify(token).map_err(|e| {
            debug!(error = %e, "auth: bearer token rejected");
            StatusCode::UNAUTHORIZED
        })?;
        Ok(Self { user_id })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
