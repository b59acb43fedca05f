//! Authentication service.
//!
//! Password login issuing signed bearer tokens, and account creation for
//! the CLI.

mod error;
pub mod token;

pub use error::AuthError;
pub use token::{IssuedToken, TokenClaims, TokenError, TokenSigner};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;

use bazaar_core::{Email, UserRole};

use crate::db::{RepositoryError, UserStore};
use crate::models::{Identity, NewUser};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Authentication service.
pub struct AuthService<'a, S: ?Sized> {
    users: &'a S,
    tokens: &'a TokenSigner,
}

impl<'a, S: UserStore + ?Sized> AuthService<'a, S> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(users: &'a S, tokens: &'a TokenSigner) -> Self {
        Self { users, tokens }
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    pub async fn login_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(Identity, IssuedToken), AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let record = self
            .users
            .find_login(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &record.password_hash)?;

        let token = self
            .tokens
            .issue(record.identity.id, record.identity.role, Utc::now())?;

        tracing::info!(user_id = %record.identity.id, "user logged in");
        Ok((record.identity, token))
    }
}

/// Create an account with email and password.
///
/// # Errors
///
/// Returns `AuthError::InvalidEmail` if the email format is invalid.
/// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
/// Returns `AuthError::UserAlreadyExists` if the email is already registered.
pub async fn register<S: UserStore + ?Sized>(
    users: &S,
    name: &str,
    email: &str,
    password: &str,
    role: UserRole,
) -> Result<Identity, AuthError> {
    let email = Email::parse(email)?;
    validate_password(password)?;
    let password_hash = hash_password(password)?;

    let user = NewUser {
        name: name.trim().to_owned(),
        email,
        password_hash,
        role,
    };

    users.create_user(&user).await.map_err(|e| match e {
        RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
        other => AuthError::Repository(other),
    })
}

// =============================================================================
// Password Helpers
// =============================================================================

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}
