//! Catalog product as read by checkout and the cart.

use serde::Serialize;

use bazaar_core::{Money, ProductId, WebsiteId};

/// A product row with its live price and stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub website_id: WebsiteId,
    pub name: String,
    pub image_url: Option<String>,
    /// Current unit price.
    pub price: Money,
    /// Units on hand. Never negative.
    pub stock: i32,
}
