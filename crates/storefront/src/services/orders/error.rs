//! Order service error types.

use thiserror::Error;

use bazaar_core::{CheckoutError, FulfillmentStatus, Money, ProductId};

use crate::db::RepositoryError;

/// Storage step at which a checkout failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStep {
    ResolveIdentity,
    Begin,
    LockProduct,
    InsertOrder,
    InsertOrderLine,
    DecrementStock,
    ClearCart,
    Commit,
}

impl std::fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ResolveIdentity => "resolve_identity",
            Self::Begin => "begin",
            Self::LockProduct => "lock_product",
            Self::InsertOrder => "insert_order",
            Self::InsertOrderLine => "insert_order_line",
            Self::DecrementStock => "decrement_stock",
            Self::ClearCart => "clear_cart",
            Self::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The request failed validation before any write.
    #[error(transparent)]
    Invalid(#[from] CheckoutError),

    /// The claimed owner could not be verified.
    #[error("identity could not be verified")]
    IdentityUnresolvable,

    /// The request names a different website than this storefront serves.
    #[error("website does not match this storefront")]
    WrongWebsite,

    /// Not enough units on hand; nothing was written.
    #[error("insufficient stock for product {product_id}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i32,
    },

    /// The client showed a price the catalog no longer has.
    #[error("price of product {product_id} has changed to {current}")]
    PriceMismatch {
        product_id: ProductId,
        quoted: Money,
        current: Money,
    },

    /// The client total does not match the sum of the lines.
    #[error("order total should be {computed}")]
    TotalMismatch { quoted: Money, computed: Money },

    /// A line or order total does not fit the amount range.
    #[error("order amount is out of range")]
    AmountOutOfRange,

    /// Order does not exist or is not visible to the caller.
    #[error("order not found")]
    NotFound,

    /// The fulfillment state machine forbids this change.
    #[error("cannot change order status from {from} to {to}")]
    InvalidTransition {
        from: FulfillmentStatus,
        to: FulfillmentStatus,
    },

    /// Another update changed the order first.
    #[error("order was modified concurrently")]
    StatusConflict,

    /// Payment was already confirmed.
    #[error("payment already completed")]
    PaymentAlreadyCompleted,

    /// A checkout write failed and the transaction was rolled back.
    #[error("order could not be placed")]
    Persistence {
        step: CheckoutStep,
        #[source]
        source: RepositoryError,
    },

    /// Repository/database error outside checkout.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl OrderError {
    /// Wrap a storage error raised at `step` of a checkout.
    pub(crate) fn at(step: CheckoutStep) -> impl Fn(RepositoryError) -> Self {
        move |source| Self::Persistence { step, source }
    }
}
