use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::middleware::ip_filter::client_ip;
use crate::AppState;

const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Counts one attempt per request against `path:client` and rejects with 429
/// once the window's budget is spent.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_ip(req.headers(), req.extensions(), state.config.trusted_proxy_depth)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let key = crate::services::RateLimiter::key(req.uri().path(), &client);

    let decision = state.rate_limiter.check(&key);
    if !decision.allowed {
        tracing::warn!(
            path = %req.uri().path(),
            client = %client,
            retry_after_secs = decision.retry_after_secs,
            "rate limit exceeded"
        );
        return Err(AppError::TooManyRequests {
            retry_after_secs: decision.retry_after_secs,
        });
    }

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REMAINING_HEADER), value);
    }
    Ok(response)
}
