//! Domain models for the storefront.
//!
//! These types are what the storage layer returns and what the JSON API
//! serializes. Row types that only exist to satisfy a query stay private to
//! the repository that uses them.

pub mod cart;
pub mod order;
pub mod product;
pub mod user;

pub use cart::CartItem;
pub use order::{
    NewOrder, NewOrderLine, OrderDetail, OrderFilter, OrderLine, OrderReceipt, OrderRecord,
    OrderSummary,
};
pub use product::CatalogProduct;
pub use user::{Identity, LoginRecord, NewUser};
