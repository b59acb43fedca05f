//! User queries for `PostgreSQL`.

use async_trait::async_trait;

use bazaar_core::{Email, UserId};

use super::{IdentityStore, PgStorage, RepositoryError, UserStore, conflict_or_database};
use crate::models::{Identity, LoginRecord, NewUser};

#[async_trait]
impl IdentityStore for PgStorage {
    async fn find_identity(&self, id: UserId) -> Result<Option<Identity>, RepositoryError> {
        let identity = sqlx::query_as::<_, Identity>(
            r"
            SELECT id, name, email, role
            FROM users
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(identity)
    }
}

#[async_trait]
impl UserStore for PgStorage {
    async fn find_login(&self, email: &Email) -> Result<Option<LoginRecord>, RepositoryError> {
        let record = sqlx::query_as::<_, LoginRecord>(
            r"
            SELECT id, name, email, role, password_hash
            FROM users
            WHERE lower(email) = lower($1)
            ",
        )
        .bind(email)
        .fetch_optional(self.pool())
        .await?;

        Ok(record)
    }

    async fn create_user(&self, user: &NewUser) -> Result<Identity, RepositoryError> {
        sqlx::query_as::<_, Identity>(
            r"
            INSERT INTO users (name, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, role
            ",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .fetch_one(self.pool())
        .await
        .map_err(|e| conflict_or_database(e, "email"))
    }
}
