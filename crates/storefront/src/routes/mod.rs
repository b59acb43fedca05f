//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                         - Liveness
//! GET  /health/ready                   - Readiness (storage ping)
//!
//! # Orders
//! POST /api/orders                     - Place an order (guest or bearer)
//! GET  /api/orders/mine                - Orders of the signed-in user
//! POST /api/orders/track               - Look up an order by reference + email
//! GET  /api/orders/{id}                - Order detail (owner or admin)
//!
//! # Admin
//! GET  /api/admin/orders               - Every order of the website
//! PUT  /api/admin/orders/{id}/status   - Move along the fulfillment states
//! POST /api/admin/orders/{id}/payment  - Confirm a pending payment
//!
//! # Cart (requires auth)
//! GET    /api/cart                     - Saved cart
//! POST   /api/cart                     - Set the quantity of a product
//! DELETE /api/cart/{product_id}        - Remove a product
//!
//! # Auth
//! POST /api/auth/login                 - Exchange a password for a bearer token
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod orders;

use std::future::Future;
use std::time::Duration;

use axum::{
    Router,
    extract::{Request, State, rejection::JsonRejection},
    http::{
        HeaderValue, Method, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::error::AppError;
use crate::middleware::{
    REQUEST_ID_HEADER, login_rate_limiter, request_id_middleware, security_headers_middleware,
    tracking_rate_limiter,
};
use crate::models::OrderDetail;
use crate::services::email::{EmailError, EmailService};
use crate::state::AppState;

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    let tracking = Router::new()
        .route("/track", post(orders::track))
        .layer(tracking_rate_limiter());

    Router::new()
        .route("/", post(orders::place))
        .route("/mine", get(orders::mine))
        .route("/{id}", get(orders::show))
        .merge(tracking)
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(admin::list_orders))
        .route("/orders/{id}/status", put(admin::update_status))
        .route("/orders/{id}/payment", post(admin::confirm_payment))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).post(cart::upsert))
        .route("/{product_id}", delete(cart::remove))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .layer(login_rate_limiter())
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api/orders", order_routes())
        .nest("/api/admin", admin_routes())
        .nest("/api/cart", cart_routes())
        .nest("/api/auth", auth_routes())
}

/// Build the application with its middleware stack.
///
/// Sentry layers are added by the binary on top of this, so tests can use
/// the router as is.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config().allowed_origins);

    routes()
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            let request_id = request
                .headers()
                .get(&REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id,
            )
        }))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// CORS for the configured storefront origins. No origins means no
/// cross-origin access at all.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if storage is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.storage().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Turn a JSON body rejection into the API's error shape.
pub(crate) fn bad_json(rejection: JsonRejection) -> AppError {
    AppError::BadRequest(rejection.body_text())
}

/// Send an order email after the response, if email is configured.
///
/// The order is already committed; a failed send is only logged.
pub(crate) fn spawn_order_email<F, Fut>(
    state: &AppState,
    detail: OrderDetail,
    kind: &'static str,
    send: F,
) where
    F: FnOnce(EmailService, OrderDetail) -> Fut + Send + 'static,
    Fut: Future<Output = (OrderDetail, Result<(), EmailError>)> + Send + 'static,
{
    let Some(mailer) = state.email().cloned() else {
        return;
    };

    tokio::spawn(async move {
        let (detail, result) = send(mailer, detail).await;
        if let Err(e) = result {
            tracing::warn!(
                order_id = %detail.order.id,
                email = kind,
                error = %e,
                "order email not sent"
            );
        }
    });
}
