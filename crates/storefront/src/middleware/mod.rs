//! HTTP middleware stack for the storefront API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, capture errors)
//! 2. Request ID (add unique ID to each request)
//! 3. `TraceLayer` (request span, tagged with the request ID)
//! 4. CORS
//! 5. Security headers
//! 6. Rate limiting on login and tracking routes only
//!
//! Authentication is not a layer: handlers take one of the extractors in
//! [`auth`].

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use auth::{MaybeAuth, OptionalAuth, RequireAdmin, RequireAuth};
pub use rate_limit::{login_rate_limiter, tracking_rate_limiter};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
pub use security_headers::security_headers_middleware;
