//! CLI command implementations.

pub mod migrate;
pub mod seed;
pub mod user;

use bazaar_storefront::config::{ConfigError, StorefrontConfig};
use sqlx::PgPool;

/// Connect to the storefront database named by the environment.
async fn connect() -> Result<PgPool, ConnectError> {
    let database_url = StorefrontConfig::database_url_from_env()?;

    tracing::info!("Connecting to storefront database...");
    Ok(bazaar_storefront::db::create_pool(&database_url).await?)
}

/// Errors that can occur while connecting.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}
