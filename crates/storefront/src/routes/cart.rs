//! Saved cart handlers.
//!
//! The cart is a convenience for signed-in users; checkout never reads it,
//! it only empties it once an order is committed.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use bazaar_core::ProductId;

use super::bad_json;
use crate::db::RepositoryError;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::CartItem;
use crate::state::AppState;

/// Largest quantity a single cart entry may hold.
const MAX_CART_QUANTITY: i32 = 999;

/// Cart update request body.
#[derive(Debug, Deserialize)]
pub struct CartUpdate {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// The signed-in user's saved cart with current catalog prices.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<CartItem>>> {
    let items = state
        .storage()
        .cart_items(state.config().checkout.website_id, user.id)
        .await?;
    Ok(Json(items))
}

/// Set the quantity of one product in the cart.
#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn upsert(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    payload: std::result::Result<Json<CartUpdate>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(update) = payload.map_err(bad_json)?;
    if !(1..=MAX_CART_QUANTITY).contains(&update.quantity) {
        return Err(AppError::BadRequest(format!(
            "quantity must be between 1 and {MAX_CART_QUANTITY}"
        )));
    }

    state
        .storage()
        .upsert_cart_item(
            state.config().checkout.website_id,
            user.id,
            update.product_id,
            update.quantity,
        )
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound("Product".to_string()),
            other => other.into(),
        })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Remove a product from the cart.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<StatusCode> {
    if state
        .storage()
        .remove_cart_item(user.id, product_id)
        .await?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Cart item".to_string()))
    }
}
