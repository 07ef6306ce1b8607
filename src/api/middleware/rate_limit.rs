use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::json;
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::config::RateLimitSettings;

/// Per-minute request budget for a group of routes.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: NonZeroU32,
}

impl RateLimitConfig {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute: NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN),
        }
    }

    pub fn limiter(&self) -> Arc<DefaultDirectRateLimiter> {
        Arc::new(RateLimiter::direct(Quota::per_minute(self.requests_per_minute)))
    }
}

/// Global rate limiting configuration
pub struct GlobalRateLimit {
    /// Every API route
    pub api: RateLimitConfig,
    /// Stricter limit for report delivery
    pub reports: RateLimitConfig,
}

impl From<&RateLimitSettings> for GlobalRateLimit {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            api: RateLimitConfig::new(settings.api_requests_per_minute),
            reports: RateLimitConfig::new(settings.report_requests_per_minute),
        }
    }
}

impl Default for GlobalRateLimit {
    fn default() -> Self {
        Self::from(&RateLimitSettings::default())
    }
}

/// Custom rate limit exceeded response
#[derive(Debug)]
pub struct RateLimitExceeded;

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "rate_limited",
                "message": "Rate limit exceeded. Please try again later.",
            })),
        )
            .into_response()
    }
}

/// Middleware for `axum::middleware::from_fn_with_state`.
pub async fn enforce(
    State(limiter): State<Arc<DefaultDirectRateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    if limiter.check().is_err() {
        warn!(path = %req.uri().path(), "Rate limit exceeded");
        return RateLimitExceeded.into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    #[tokio::test]
    async fn exceeded_response_is_json() {
        let response = RateLimitExceeded.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "rate_limited");
        assert!(body["message"].as_str().unwrap().contains("Rate limit"));
    }

    #[test]
    fn zero_budget_falls_back_to_one_request() {
        let config = RateLimitConfig::new(0);
        let limiter = config.limiter();
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }
}
