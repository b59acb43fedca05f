//! Bazaar Storefront library.
//!
//! The public JSON API of a Bazaar shop: checkout, order queries and
//! tracking, order administration, saved carts and password login. The
//! binary in `main.rs` wires it to `PostgreSQL`; tests drive the same router
//! against [`db::MemoryStorage`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
