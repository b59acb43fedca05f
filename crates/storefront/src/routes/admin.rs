//! Order administration handlers. Every handler requires an admin account.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde::Deserialize;
use tracing::instrument;

use bazaar_core::{FulfillmentStatus, OrderId};

use super::{bad_json, spawn_order_email};
use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireAdmin;
use crate::models::{OrderDetail, OrderSummary};
use crate::services::orders::OrderService;
use crate::state::AppState;

/// Status update request body.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: FulfillmentStatus,
}

/// Every order of the website, newest first.
#[instrument(skip_all)]
pub async fn list_orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Vec<OrderSummary>>> {
    let orders = OrderService::new(state.storage(), &state.config().checkout)
        .get_all_orders()
        .await?;
    Ok(Json(orders))
}

/// Move an order to a new fulfillment status and tell the customer.
#[instrument(skip(state, admin, payload), fields(admin_id = %admin.id))]
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    payload: std::result::Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<OrderDetail>> {
    let Json(update) = payload.map_err(bad_json)?;
    let order = OrderService::new(state.storage(), &state.config().checkout)
        .update_order_status(id, update.status)
        .await?;

    add_breadcrumb(
        "admin",
        "order status updated",
        Some(&[("order_id", &id.to_string()), ("status", update.status.as_str())]),
    );

    spawn_order_email(
        &state,
        order.clone(),
        "status_update",
        |mailer, detail| async move {
            let result = mailer.send_status_update(&detail).await;
            (detail, result)
        },
    );

    Ok(Json(order))
}

/// Mark a pending payment as received.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn confirm_payment(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    let order = OrderService::new(state.storage(), &state.config().checkout)
        .confirm_payment(id)
        .await?;
    Ok(Json(order))
}
