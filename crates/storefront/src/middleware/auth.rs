//! Bearer token extractors.
//!
//! Route handlers declare how much authentication they need by taking one
//! of these extractors:
//!
//! - [`MaybeAuth`] - anonymous callers allowed, a bad token is handed to
//!   the handler instead of rejected
//! - [`OptionalAuth`] - anonymous callers allowed, a bad token is still 401
//! - [`RequireAuth`] - a valid token for an existing account
//! - [`RequireAdmin`] - as above, and the account is an admin
//!
//! Roles are re-read from storage on every request, so demoting an admin
//! takes effect before their token expires.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;

use crate::error::{AppError, set_sentry_user};
use crate::models::Identity;
use crate::services::auth::{AuthError, TokenClaims, TokenError};
use crate::state::AppState;

/// Outcome of verifying the bearer token, if the request carried one.
///
/// For handlers that decide for themselves what a stale or forged token
/// means. A header without the `Bearer` scheme is still rejected.
pub struct MaybeAuth(pub Result<Option<TokenClaims>, TokenError>);

/// Claims of a verified bearer token, if the request carried one.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(OptionalAuth(claims): OptionalAuth) -> impl IntoResponse {
///     match claims {
///         Some(c) => format!("Hello, user {}!", c.sub),
///         None => "Hello, guest!".to_string(),
///     }
/// }
/// ```
pub struct OptionalAuth(pub Option<TokenClaims>);

/// A signed-in account.
pub struct RequireAuth(pub Identity);

/// A signed-in admin account.
pub struct RequireAdmin(pub Identity);

impl FromRequestParts<AppState> for MaybeAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts)? else {
            return Ok(Self(Ok(None)));
        };

        Ok(Self(state.tokens().verify(token, Utc::now()).map(Some)))
    }
}

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let MaybeAuth(verified) = MaybeAuth::from_request_parts(parts, state).await?;
        Ok(Self(verified.map_err(AuthError::from)?))
    }
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let OptionalAuth(claims) = OptionalAuth::from_request_parts(parts, state).await?;
        let claims =
            claims.ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

        let identity = state
            .storage()
            .find_identity(claims.sub)
            .await?
            .ok_or_else(|| {
                tracing::warn!(user_id = %claims.sub, "token for a deleted account");
                AppError::Unauthorized("Authentication required".to_string())
            })?;

        set_sentry_user(&identity.id, Some(identity.email.as_str()));
        Ok(Self(identity))
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(identity) = RequireAuth::from_request_parts(parts, state).await?;
        if !identity.is_admin() {
            tracing::warn!(user_id = %identity.id, path = %parts.uri.path(), "admin route denied");
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(Self(identity))
    }
}

/// The token of an `Authorization: Bearer <token>` header.
///
/// A missing header is `Ok(None)`; any other scheme is rejected rather
/// than silently treated as anonymous.
fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(Some)
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization header".to_string()))
}
