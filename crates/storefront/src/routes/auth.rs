//! Authentication handlers.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::bad_json;
use crate::error::{Result, set_sentry_user};
use crate::models::Identity;
use crate::services::auth::AuthService;
use crate::state::AppState;

/// Login request body.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// A bearer token and the account it belongs to.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Identity,
}

/// Exchange email and password for a bearer token.
///
/// Wrong email and wrong password produce the same 401.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>> {
    let Json(request) = payload.map_err(bad_json)?;

    let (user, issued) = AuthService::new(state.storage(), state.tokens())
        .login_with_password(&request.email, &request.password)
        .await?;

    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(Json(LoginResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user,
    }))
}
