//! Integration tests for Bazaar.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bazaar-integration-tests
//! ```
//!
//! Every test builds its own [`TestApp`]: the full storefront router over a
//! fresh [`MemoryStorage`], driven with `tower::ServiceExt::oneshot`. No
//! database, SMTP server or network port is involved.
//!
//! # Fixture
//!
//! Website 1 ("Bazaar Demo") is the storefront under test; website 2
//! ("Other Shop") exists so tenant scoping can be checked.
//!
//! | id | product     | website | price | stock |
//! |----|-------------|---------|-------|-------|
//! | 1  | Tea Mug     | 1       | 10.00 | 5     |
//! | 2  | Teapot      | 1       | 30.00 | 1     |
//! | 3  | Foreign Cup | 2       | 8.00  | 10    |
//!
//! | id | account | role     | email             |
//! |----|---------|----------|-------------------|
//! | 7  | Ann     | customer | ann@example.com   |
//! | 8  | Bo      | customer | bo@example.com    |
//! | 9  | Cy      | admin    | cy@example.com    |

#![allow(clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

use bazaar_core::{Email, Money, ProductId, UserId, UserRole, WebsiteId};
use bazaar_storefront::config::{AuthConfig, CheckoutConfig, IdentityPolicy, StorefrontConfig};
use bazaar_storefront::db::MemoryStorage;
use bazaar_storefront::models::{CatalogProduct, Identity};
use bazaar_storefront::services::auth::hash_password;
use bazaar_storefront::{AppState, create_router};

/// The storefront's own website.
pub const WEBSITE: WebsiteId = WebsiteId::new(1);
/// Another tenant in the same store.
pub const OTHER_WEBSITE: WebsiteId = WebsiteId::new(2);

pub const MUG: ProductId = ProductId::new(1);
pub const TEAPOT: ProductId = ProductId::new(2);
pub const FOREIGN_CUP: ProductId = ProductId::new(3);

pub const ANN: UserId = UserId::new(7);
pub const BO: UserId = UserId::new(8);
pub const CY: UserId = UserId::new(9);

/// Password of every fixture account.
pub const PASSWORD: &str = "correct horse battery";

/// Origin allowed by the test CORS configuration.
pub const ALLOWED_ORIGIN: &str = "https://shop.example.com";

/// A storefront wired to in-memory storage.
pub struct TestApp {
    pub storage: MemoryStorage,
    pub state: AppState,
    router: Router,
}

/// A response with its body parsed as JSON when possible.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    /// Parsed JSON, `Value::Null` for an empty body, or the raw text as a
    /// string if it is not JSON.
    pub body: Value,
}

/// Configuration for tests. Never read from the environment.
#[must_use]
pub fn test_config(identity_policy: IdentityPolicy) -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://unused"),
        host: [127, 0, 0, 1].into(),
        port: 0,
        auth: AuthConfig {
            token_secret: SecretString::from("t3st-Secret-for-integration-9x8w7v6u"),
            token_ttl: Duration::from_secs(3600),
        },
        checkout: CheckoutConfig {
            website_id: WEBSITE,
            identity_policy,
            price_tolerance: Money::from_cents(1).expect("one cent"),
        },
        allowed_origins: vec![ALLOWED_ORIGIN.to_string()],
        log_json: false,
        email: None,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

fn money(cents: i64) -> Money {
    Money::from_cents(cents).expect("fixture amounts are positive")
}

fn identity(id: UserId, name: &str, email: &str, role: UserRole) -> Identity {
    Identity {
        id,
        name: name.to_string(),
        email: Email::parse(email).expect("fixture emails are valid"),
        role,
    }
}

fn product(id: ProductId, website_id: WebsiteId, name: &str, cents: i64, stock: i32) -> CatalogProduct {
    CatalogProduct {
        id,
        website_id,
        name: name.to_string(),
        image_url: None,
        price: money(cents),
        stock,
    }
}

impl TestApp {
    /// The fixture under the default (strict) identity policy.
    pub async fn new() -> Self {
        Self::with_policy(IdentityPolicy::Strict).await
    }

    pub async fn with_policy(identity_policy: IdentityPolicy) -> Self {
        let storage = MemoryStorage::new();
        storage.add_website(WEBSITE, "Bazaar Demo").await;
        storage.add_website(OTHER_WEBSITE, "Other Shop").await;

        storage.put_product(product(MUG, WEBSITE, "Tea Mug", 1000, 5)).await;
        storage.put_product(product(TEAPOT, WEBSITE, "Teapot", 3000, 1)).await;
        storage
            .put_product(product(FOREIGN_CUP, OTHER_WEBSITE, "Foreign Cup", 800, 10))
            .await;

        let hash = hash_password(PASSWORD).expect("hashing works");
        for account in [
            identity(ANN, "Ann", "ann@example.com", UserRole::Customer),
            identity(BO, "Bo", "bo@example.com", UserRole::Customer),
            identity(CY, "Cy", "cy@example.com", UserRole::Admin),
        ] {
            storage.put_user(account, &hash).await;
        }

        let state = AppState::new(
            test_config(identity_policy),
            Arc::new(storage.clone()),
            None,
        );
        let router = create_router(state.clone());

        Self {
            storage,
            state,
            router,
        }
    }

    /// A valid bearer token for a fixture account.
    #[must_use]
    pub fn token(&self, user_id: UserId) -> String {
        let role = if user_id == CY {
            UserRole::Admin
        } else {
            UserRole::Customer
        };
        self.state
            .tokens()
            .issue(user_id, role, Utc::now())
            .expect("token issues")
            .token
    }

    /// Send a request through the full middleware stack.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            // Rate limiters key on the proxy-reported client address.
            .header("x-forwarded-for", "203.0.113.7");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request builds");

        self.send_request(request).await
    }

    /// Send a prebuilt request.
    pub async fn send_request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    /// Stock left for a product.
    pub async fn stock(&self, product_id: ProductId) -> i32 {
        self.storage
            .product(product_id)
            .await
            .map_or(0, |p| p.stock)
    }
}

/// Read a JSON amount (string or number) as a decimal.
#[must_use]
pub fn amount(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not an amount: {other}"),
    }
}

/// A decimal literal, for comparing with [`amount`].
#[must_use]
pub fn dec(s: &str) -> Decimal {
    s.parse().expect("decimal literal")
}
