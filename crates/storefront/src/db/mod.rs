//! Storage for the storefront.
//!
//! # Stores
//!
//! Request handlers and services only see the traits below. Two backends
//! implement all of them:
//!
//! - [`PgStorage`] - `PostgreSQL` via sqlx, used by the binary
//! - [`MemoryStorage`] - in-process state, used by tests and local demos
//!
//! ## Tables
//!
//! - `websites` - Tenants served by a storefront instance
//! - `users` - Registered accounts with argon2 password hashes
//! - `products` - Catalog with live price and stock
//! - `orders` / `order_items` - Placed orders and their captured prices
//! - `cart` - Saved cart entries per user
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p bazaar-cli -- migrate
//! ```

pub mod cart;
pub mod checkout;
pub mod memory;
pub mod orders;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use bazaar_core::{
    Email, FulfillmentStatus, OrderId, OrderLineId, PaymentStatus, ProductId, UserId, WebsiteId,
};

use crate::models::{
    CartItem, CatalogProduct, Identity, LoginRecord, NewOrder, NewOrderLine, NewUser,
    OrderDetail, OrderFilter, OrderRecord, OrderSummary,
};

pub use memory::{FailPoint, MemoryStorage};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Map a unique violation to `Conflict`, anything else to `Database`.
pub(crate) fn conflict_or_database(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

/// Outcome of a conditional stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockUpdate {
    /// Stock was reduced by the full quantity.
    Applied,
    /// The product has fewer units than requested; nothing changed.
    Insufficient,
    /// The product does not exist.
    Missing,
}

/// Looks up registered accounts by id.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fetch an account, `None` if it does not exist.
    async fn find_identity(&self, id: UserId) -> Result<Option<Identity>, RepositoryError>;
}

/// Opens checkout transactions.
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    /// Start a unit of work. Nothing it writes is visible to other readers
    /// until [`CheckoutTransaction::commit`] succeeds.
    async fn begin_checkout(&self) -> Result<Box<dyn CheckoutTransaction>, RepositoryError>;
}

/// The writes of one checkout, applied all together or not at all.
///
/// Dropping a transaction without committing discards it.
#[async_trait]
pub trait CheckoutTransaction: Send {
    /// Read a product of `website_id` and hold it against concurrent
    /// checkouts until this transaction ends.
    async fn lock_product(
        &mut self,
        website_id: WebsiteId,
        product_id: ProductId,
    ) -> Result<Option<CatalogProduct>, RepositoryError>;

    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderRecord, RepositoryError>;

    async fn insert_order_line(
        &mut self,
        line: &NewOrderLine,
    ) -> Result<OrderLineId, RepositoryError>;

    /// Reduce stock by `quantity` only if at least that many units remain.
    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<StockUpdate, RepositoryError>;

    /// Delete every saved cart entry of `user_id`. Returns the number removed.
    async fn clear_cart(&mut self, user_id: UserId) -> Result<u64, RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Reads and status updates of placed orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Orders matching `filter`, newest first.
    async fn list_orders(&self, filter: &OrderFilter)
    -> Result<Vec<OrderSummary>, RepositoryError>;

    async fn get_order(
        &self,
        website_id: WebsiteId,
        id: OrderId,
    ) -> Result<Option<OrderDetail>, RepositoryError>;

    /// An order whose guest email or owner email equals `email`, ignoring case.
    async fn find_for_tracking(
        &self,
        website_id: WebsiteId,
        id: OrderId,
        email: &Email,
    ) -> Result<Option<OrderDetail>, RepositoryError>;

    /// Set the status to `to` only if it is currently `from`.
    ///
    /// Returns `false` when the order is missing or its status moved on.
    async fn transition_status(
        &self,
        website_id: WebsiteId,
        id: OrderId,
        from: FulfillmentStatus,
        to: FulfillmentStatus,
    ) -> Result<bool, RepositoryError>;

    /// Set the payment status to `to` only if it is currently `from`.
    async fn transition_payment(
        &self,
        website_id: WebsiteId,
        id: OrderId,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<bool, RepositoryError>;
}

/// Saved cart entries.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart_items(
        &self,
        website_id: WebsiteId,
        user_id: UserId,
    ) -> Result<Vec<CartItem>, RepositoryError>;

    /// Insert or replace the quantity of a cart entry.
    ///
    /// Returns `RepositoryError::NotFound` if the product is not part of the
    /// website's catalog.
    async fn upsert_cart_item(
        &self,
        website_id: WebsiteId,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError>;

    /// Returns `false` if there was no such entry.
    async fn remove_cart_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError>;
}

/// Account creation and password lookup.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_login(&self, email: &Email) -> Result<Option<LoginRecord>, RepositoryError>;

    /// Returns `RepositoryError::Conflict` if the email is taken.
    async fn create_user(&self, user: &NewUser) -> Result<Identity, RepositoryError>;
}

/// Backend liveness, used by the readiness probe.
#[async_trait]
pub trait StorageHealth: Send + Sync {
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Everything the storefront needs from a backend.
pub trait Storage:
    IdentityStore + CheckoutStore + OrderStore + CartStore + UserStore + StorageHealth
{
}

impl<T> Storage for T where
    T: IdentityStore + CheckoutStore + OrderStore + CartStore + UserStore + StorageHealth
{
}

/// `PostgreSQL` backend.
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StorageHealth for PgStorage {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
