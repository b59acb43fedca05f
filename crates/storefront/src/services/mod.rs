//! Business logic services for storefront.
//!
//! # Services
//!
//! - `orders` - Checkout, order queries, tracking and status changes
//! - `auth` - Password login and bearer tokens
//! - `email` - Order confirmation and status update emails

pub mod auth;
pub mod email;
pub mod orders;
