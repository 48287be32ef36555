mod common;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
};
use freshcut_store::create_app;
use std::net::SocketAddr;
use tower::ServiceExt;

use common::{test_app, test_config};

/// A body the JSON extractor rejects, so the handler never reaches the database.
fn login_request(peer: &str) -> Request<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let addr: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

#[tokio::test]
async fn test_login_is_limited_per_client() {
    let mut config = test_config();
    config.rate_limit.max_attempts = 2;
    let app = test_app(config);
    let router = create_app(app.state.clone());

    for expected_remaining in ["1", "0"] {
        let response = router
            .clone()
            .oneshot(login_request("198.51.100.7:40000"))
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("x-ratelimit-remaining").unwrap(),
            expected_remaining
        );
    }

    let limited = router
        .clone()
        .oneshot(login_request("198.51.100.7:40001"))
        .await
        .unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = limited
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1 && retry_after <= 900);

    // A different client has its own window.
    let other = router
        .oneshot(login_request("198.51.100.8:40000"))
        .await
        .unwrap();
    assert_ne!(other.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_routes_are_counted_separately() {
    let mut config = test_config();
    config.rate_limit.max_attempts = 1;
    let app = test_app(config);
    let router = create_app(app.state.clone());

    let first = router
        .clone()
        .oneshot(login_request("198.51.100.9:40000"))
        .await
        .unwrap();
    assert_ne!(first.status(), StatusCode::TOO_MANY_REQUESTS);

    let mut register = Request::builder()
        .method("POST")
        .uri("/api/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    register
        .extensions_mut()
        .insert(ConnectInfo("198.51.100.9:40000".parse::<SocketAddr>().unwrap()));
    let response = router.oneshot(register).await.unwrap();
    assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_unlimited_routes_are_not_counted() {
    let mut config = test_config();
    config.rate_limit.max_attempts = 1;
    let app = test_app(config);
    let router = create_app(app.state.clone());

    for _ in 0..3 {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/auth/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
