//! Order administration.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::{Method, StatusCode};
use serde_json::json;

use bazaar_integration_tests::{ANN, CY, TestApp};

async fn guest_order(app: &TestApp) -> i64 {
    let response = app
        .post(
            "/api/orders",
            None,
            json!({
                "guest_email": "dee@example.com",
                "items": [{"product_id": 1, "quantity": 1}],
                "total_amount": "10.00",
                "shipping_address": "4 Harbour Rd",
                "payment_method": "Card",
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    response.body["order_id"].as_i64().unwrap()
}

async fn set_status(app: &TestApp, token: &str, id: i64, status: &str) -> StatusCode {
    app.send(
        Method::PUT,
        &format!("/api/admin/orders/{id}/status"),
        Some(token),
        Some(json!({"status": status})),
    )
    .await
    .status
}

#[tokio::test]
async fn test_admin_routes_reject_customers() {
    let app = TestApp::new().await;
    let customer = app.token(ANN);

    let list = app.get("/api/admin/orders", Some(&customer)).await;
    assert_eq!(list.status, StatusCode::FORBIDDEN);
    assert_eq!(list.body["error"], "Admin access required");

    let anonymous = app.get("/api/admin/orders", None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_lists_every_order() {
    let app = TestApp::new().await;
    guest_order(&app).await;
    guest_order(&app).await;

    let list = app.get("/api/admin/orders", Some(&app.token(CY))).await;
    assert_eq!(list.status, StatusCode::OK);
    let orders = list.body.as_array().unwrap();
    assert_eq!(orders.len(), 2);
    // Newest first
    assert!(orders[0]["id"].as_i64() > orders[1]["id"].as_i64());
}

#[tokio::test]
async fn test_fulfillment_follows_the_state_machine() {
    let app = TestApp::new().await;
    let admin = app.token(CY);
    let id = guest_order(&app).await;

    assert_eq!(set_status(&app, &admin, id, "shipped").await, StatusCode::CONFLICT);
    assert_eq!(set_status(&app, &admin, id, "processing").await, StatusCode::OK);
    assert_eq!(set_status(&app, &admin, id, "shipped").await, StatusCode::OK);
    assert_eq!(set_status(&app, &admin, id, "cancelled").await, StatusCode::CONFLICT);
    assert_eq!(set_status(&app, &admin, id, "delivered").await, StatusCode::OK);
    assert_eq!(set_status(&app, &admin, id, "pending").await, StatusCode::CONFLICT);
    assert_eq!(set_status(&app, &admin, id, "lost").await, StatusCode::BAD_REQUEST);
    assert_eq!(set_status(&app, &admin, 4242, "processing").await, StatusCode::NOT_FOUND);

    let order = app.get(&format!("/api/orders/{id}"), Some(&admin)).await;
    assert_eq!(order.body["status"], "delivered");
}

#[tokio::test]
async fn test_confirm_payment_once() {
    let app = TestApp::new().await;
    let admin = app.token(CY);
    let id = guest_order(&app).await;
    let uri = format!("/api/admin/orders/{id}/payment");

    let confirmed = app.send(Method::POST, &uri, Some(&admin), None).await;
    assert_eq!(confirmed.status, StatusCode::OK);
    assert_eq!(confirmed.body["payment_status"], "completed");

    let again = app.send(Method::POST, &uri, Some(&admin), None).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
}
