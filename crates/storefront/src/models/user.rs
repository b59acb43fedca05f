//! User domain types.

use serde::Serialize;

use bazaar_core::{Email, UserId, UserRole};

/// A registered account as seen by checkout and authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Identity {
    /// Unique user ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Login and contact email.
    pub email: Email,
    pub role: UserRole,
}

impl Identity {
    /// Whether this account may manage every order of the website.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// An identity together with its stored password hash.
///
/// Only the login path reads this; the hash never leaves the auth service.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoginRecord {
    #[sqlx(flatten)]
    pub identity: Identity,
    pub password_hash: String,
}

/// Data needed to create an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: Email,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub role: UserRole,
}
