//! Saved cart entries.

use serde::Serialize;

use bazaar_core::{Money, ProductId};

/// One saved cart line joined with its product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    pub image_url: Option<String>,
    /// Current catalog price, not a captured one.
    pub price: Money,
    pub quantity: i32,
}
