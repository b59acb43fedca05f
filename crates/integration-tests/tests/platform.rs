//! Login, cart, health checks and the middleware stack.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::json;

use bazaar_integration_tests::{ALLOWED_ORIGIN, ANN, FOREIGN_CUP, MUG, PASSWORD, TestApp, amount, dec};

#[tokio::test]
async fn test_login_issues_a_working_token() {
    let app = TestApp::new().await;

    let login = app
        .post(
            "/api/auth/login",
            None,
            json!({"email": "Ann@Example.com", "password": PASSWORD}),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK, "{:?}", login.body);
    assert_eq!(login.body["user"]["id"], 7);
    assert_eq!(login.body["user"]["role"], "customer");

    let token = login.body["token"].as_str().unwrap();
    let mine = app.get("/api/orders/mine", Some(token)).await;
    assert_eq!(mine.status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_failures_are_uniform_and_limited() {
    let app = TestApp::new().await;

    let wrong_password = app
        .post(
            "/api/auth/login",
            None,
            json!({"email": "ann@example.com", "password": "nope nope"}),
        )
        .await;
    let unknown = app
        .post(
            "/api/auth/login",
            None,
            json!({"email": "zed@example.com", "password": PASSWORD}),
        )
        .await;
    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.body, unknown.body);

    // Burst of 5 per client, two used above.
    let mut statuses = Vec::new();
    for _ in 0..4 {
        let response = app
            .post(
                "/api/auth/login",
                None,
                json!({"email": "ann@example.com", "password": "nope nope"}),
            )
            .await;
        statuses.push(response.status);
    }
    assert_eq!(statuses.last(), Some(&StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn test_cart_lifecycle() {
    let app = TestApp::new().await;
    let token = app.token(ANN);

    assert_eq!(
        app.post("/api/cart", Some(&token), json!({"product_id": 1, "quantity": 2}))
            .await
            .status,
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        app.post("/api/cart", Some(&token), json!({"product_id": 1, "quantity": 3}))
            .await
            .status,
        StatusCode::NO_CONTENT
    );

    let cart = app.get("/api/cart", Some(&token)).await;
    assert_eq!(cart.status, StatusCode::OK);
    let items = cart.body.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 3);
    assert_eq!(items[0]["name"], "Tea Mug");
    assert_eq!(amount(&items[0]["price"]), dec("10.00"));

    let foreign = app
        .post(
            "/api/cart",
            Some(&token),
            json!({"product_id": FOREIGN_CUP.as_i32(), "quantity": 1}),
        )
        .await;
    assert_eq!(foreign.status, StatusCode::NOT_FOUND);

    let zero = app
        .post("/api/cart", Some(&token), json!({"product_id": 1, "quantity": 0}))
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/cart/{}", MUG.as_i32());
    let removed = app.send(Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(removed.status, StatusCode::NO_CONTENT);
    let again = app.send(Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
    assert!(app.storage.cart_of(ANN).await.is_empty());
}

#[tokio::test]
async fn test_cart_needs_a_token() {
    let app = TestApp::new().await;
    assert_eq!(app.get("/api/cart", None).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new().await;

    let live = app.get("/health", None).await;
    assert_eq!(live.status, StatusCode::OK);
    assert_eq!(live.body, "ok");

    let ready = app.get("/health/ready", None).await;
    assert_eq!(ready.status, StatusCode::OK);
}

#[tokio::test]
async fn test_every_response_is_hardened_and_tagged() {
    let app = TestApp::new().await;

    let response = app.get("/api/orders/mine", None).await;
    assert_eq!(response.headers["x-content-type-options"], "nosniff");
    assert_eq!(response.headers["x-frame-options"], "DENY");
    assert_eq!(response.headers["cross-origin-opener-policy"], "same-origin-allow-popups");
    assert!(response.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_cors_preflight() {
    let app = TestApp::new().await;

    let preflight = |origin: &str| {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/orders")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap()
    };

    let allowed = app.send_request(preflight(ALLOWED_ORIGIN)).await;
    assert_eq!(
        allowed.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        ALLOWED_ORIGIN
    );

    let other = app.send_request(preflight("https://evil.example")).await;
    assert!(!other.headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}
