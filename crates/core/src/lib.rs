//! Bazaar Core - Shared domain types.
//!
//! This crate provides the types shared by every Bazaar component:
//! - `storefront` - Public JSON API (checkout, orders, cart, auth)
//! - `cli` - Command-line tools for migrations, users and catalog seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure validation - no I/O, no
//! database access, no HTTP clients. Checkout requests are validated here so
//! that every rejection that does not need the catalog happens before a
//! storage transaction is opened.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, money, statuses and order references
//! - [`checkout`] - Checkout request shape and its fail-fast validation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod checkout;
pub mod types;

pub use checkout::{
    CheckoutError, CheckoutItem, CheckoutRequest, GuestContact, LineItemIssue, ValidCheckout,
    ValidItem,
};
pub use types::*;
