//! Per-client rate limiting using governor and `tower_governor`.
//!
//! Only the endpoints that accept guessable secrets are limited:
//! - `login_rate_limiter`: password login (~10/min)
//! - `tracking_rate_limiter`: order tracking by reference and email (~30/min)

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::Request;
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

/// Proxy headers carrying the client address, most specific first.
const CLIENT_IP_HEADERS: [&str; 3] = ["cf-connecting-ip", "x-real-ip", "x-forwarded-for"];

/// Keys requests by the client address reported by the reverse proxy.
///
/// For `X-Forwarded-For` the first (client-most) address in the chain is
/// used. Requests without any usable header are rejected by the limiter.
#[derive(Clone, Copy)]
pub struct ClientIpKeyExtractor;

impl tower_governor::key_extractor::KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let headers = req.headers();

        CLIENT_IP_HEADERS
            .iter()
            .filter_map(|name| headers.get(*name))
            .filter_map(|v| v.to_str().ok())
            .find_map(|v| v.split(',').next()?.trim().parse::<IpAddr>().ok())
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Rate limiter for password login: ~10 requests per minute per IP.
///
/// One request replenished every 6 seconds, burst of 5.
///
/// # Panics
///
/// Never in practice: `GovernorConfigBuilder` only refuses a zero period or
/// burst, and both are non-zero constants here.
#[must_use]
pub fn login_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(6)
        .burst_size(5)
        .finish()
        .expect("login rate limiter uses non-zero period and burst");
    GovernorLayer::new(Arc::new(config))
}

/// Rate limiter for order tracking: ~30 requests per minute per IP.
///
/// One request replenished every 2 seconds, burst of 10. Tracking answers
/// with the same 404 whichever half of the pair was wrong, and this keeps
/// enumerating references by email impractical.
///
/// # Panics
///
/// Never in practice, see [`login_rate_limiter`].
#[must_use]
pub fn tracking_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(2)
        .burst_size(10)
        .finish()
        .expect("tracking rate limiter uses non-zero period and burst");
    GovernorLayer::new(Arc::new(config))
}
