//! Account management commands.
//!
//! # Usage
//!
//! ```bash
//! BAZAAR_USER_PASSWORD='...' bz-cli user create -e admin@example.com -n "Shop Admin" -r admin
//! ```

use thiserror::Error;

use bazaar_core::UserRole;
use bazaar_storefront::db::PgStorage;
use bazaar_storefront::services::auth::{self, AuthError};

use super::ConnectError;

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: customer, admin")]
    InvalidRole(String),

    /// Account already exists.
    #[error("An account already exists with email: {0}")]
    UserExists(String),

    #[error(transparent)]
    Auth(AuthError),
}

/// Create a new account.
///
/// # Returns
///
/// The ID of the created account.
///
/// # Errors
///
/// Returns `UserError` if an argument is invalid, the email is taken, or
/// the database fails.
pub async fn create(email: &str, name: &str, role: &str, password: &str) -> Result<i32, UserError> {
    let role: UserRole = role
        .parse()
        .map_err(|_| UserError::InvalidRole(role.to_owned()))?;

    let storage = PgStorage::new(super::connect().await?);
    tracing::info!("Creating account: {} ({})", email, role);

    let identity = auth::register(&storage, name, email, password, role)
        .await
        .map_err(|e| match e {
            AuthError::UserAlreadyExists => UserError::UserExists(email.to_owned()),
            other => UserError::Auth(other),
        })?;

    tracing::info!(
        "Account created successfully! ID: {}, Email: {}, Role: {}",
        identity.id,
        identity.email,
        identity.role
    );

    Ok(identity.id.as_i32())
}
