use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::utils::sanitize::{sanitize_json, sanitize_query};

const MAX_BODY_LOG_SIZE: usize = 16 * 1024;
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Reuses a caller-supplied request id when it is a valid header value,
/// otherwise mints one. The id is echoed on the response.
fn request_id_for(req: &Request) -> HeaderValue {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .filter(|value| !value.is_empty() && value.len() <= 64)
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("unknown"))
}

fn body_logging_enabled() -> bool {
    std::env::var("LOG_REQUEST_BODY")
        .map(|flag| flag.eq_ignore_ascii_case("true") || flag == "1")
        .unwrap_or(false)
}

/// Loggable form of a request body with credentials and card data masked.
fn body_preview(bytes: &Bytes) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(json) => serde_json::to_string(&sanitize_json(&json))
            .unwrap_or_else(|_| "[invalid json]".to_string()),
        Err(_) => format!("[non-json, {} bytes]", bytes.len()),
    }
}

pub async fn request_logger_middleware(mut req: Request, next: Next) -> Response {
    let request_id = request_id_for(&req);
    req.headers_mut().insert(REQUEST_ID_HEADER, request_id.clone());

    let span = tracing::info_span!(
        "http_request",
        request_id = request_id.to_str().unwrap_or_default(),
        method = %req.method(),
        path = req.uri().path(),
    );
    let query = req.uri().query().map(sanitize_query).unwrap_or_default();

    async move {
        let started = Instant::now();

        if body_logging_enabled() {
            let (parts, body) = req.into_parts();
            let Ok(bytes) = axum::body::to_bytes(body, MAX_BODY_LOG_SIZE).await else {
                tracing::warn!("request body too large or unreadable");
                return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
            };
            tracing::info!(
                query = %query,
                body_size = bytes.len(),
                body = %body_preview(&bytes),
                "incoming request"
            );
            req = Request::from_parts(parts, Body::from(bytes));
        } else {
            tracing::info!(query = %query, "incoming request");
        }

        let mut response = next.run(req).await;
        tracing::info!(
            status = response.status().as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );

        response.headers_mut().insert(REQUEST_ID_HEADER, request_id);
        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/api/auth/login", post(|| async { "ok" }))
            .layer(axum::middleware::from_fn(request_logger_middleware))
    }

    #[tokio::test]
    async fn adds_request_id_to_response() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/login")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn echoes_caller_request_id() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/login")
                    .header(REQUEST_ID_HEADER, "checkout-7f3a")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[REQUEST_ID_HEADER], "checkout-7f3a");
    }

    #[test]
    fn body_preview_masks_password() {
        let bytes = Bytes::from_static(br#"{"email":"a@b.vn","password":"hunter2"}"#);
        let preview = body_preview(&bytes);
        assert!(!preview.contains("hunter2"));
        assert!(preview.contains("a@b.vn"));

        assert_eq!(body_preview(&Bytes::from_static(b"plain")), "[non-json, 5 bytes]");
        assert_eq!(body_preview(&Bytes::new()), "");
    }
}
