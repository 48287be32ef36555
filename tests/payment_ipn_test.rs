mod common;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
};
use freshcut_store::config::parse_allowed_ips;
use freshcut_store::create_app;
use freshcut_store::domain::OrderStatus;
use std::net::SocketAddr;
use tower::ServiceExt;

use common::{body_json, order, signed_callback, test_app, test_config, to_query};

fn ipn_request(query: &str, peer: &str) -> Request<Body> {
    let mut request = Request::builder()
        .uri(format!("/api/payment/vnpay/ipn?{}", query))
        .body(Body::empty())
        .unwrap();
    let addr: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

#[tokio::test]
async fn test_valid_ipn_confirms_payment() {
    let app = test_app(test_config());
    app.orders.insert(order(1, 10, OrderStatus::AwaitingPayment, 480_000));
    let router = create_app(app.state.clone());

    let query = to_query(&signed_callback(1, 480_000, "00"));
    let response = router.oneshot(ipn_request(&query, "113.160.92.10:443")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["RspCode"], "00");
    assert_eq!(body["Message"], "Confirm Success");
    assert_eq!(app.orders.snapshot(1).unwrap().status, OrderStatus::Paid);
}

#[tokio::test]
async fn test_tampered_ipn_is_rejected_with_97() {
    let app = test_app(test_config());
    app.orders.insert(order(2, 10, OrderStatus::AwaitingPayment, 480_000));
    let router = create_app(app.state.clone());

    let mut params = signed_callback(2, 480_000, "00");
    params.insert("vnp_Amount".to_string(), "100".to_string());
    let response = router
        .oneshot(ipn_request(&to_query(&params), "113.160.92.10:443"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["RspCode"], "97");
    assert_eq!(app.orders.snapshot(2).unwrap().status, OrderStatus::AwaitingPayment);
    assert!(app.orders.all_logs().is_empty());
}

#[tokio::test]
async fn test_ipn_without_signature_is_rejected() {
    let app = test_app(test_config());
    let router = create_app(app.state.clone());

    let mut params = signed_callback(3, 10_000, "00");
    params.remove("vnp_SecureHash");
    let response = router
        .oneshot(ipn_request(&to_query(&params), "113.160.92.10:443"))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["RspCode"], "97");
}

#[tokio::test]
async fn test_repeated_ipn_returns_already_confirmed() {
    let app = test_app(test_config());
    app.orders.insert(order(4, 10, OrderStatus::AwaitingPayment, 50_000));
    let query = to_query(&signed_callback(4, 50_000, "00"));

    let first = create_app(app.state.clone())
        .oneshot(ipn_request(&query, "113.160.92.10:443"))
        .await
        .unwrap();
    assert_eq!(body_json(first).await["RspCode"], "00");

    let second = create_app(app.state.clone())
        .oneshot(ipn_request(&query, "113.160.92.10:443"))
        .await
        .unwrap();
    assert_eq!(body_json(second).await["RspCode"], "02");
    assert_eq!(app.orders.all_logs().len(), 1);
}

#[tokio::test]
async fn test_ipn_for_unknown_order_returns_01() {
    let app = test_app(test_config());
    let query = to_query(&signed_callback(999, 50_000, "00"));

    let response = create_app(app.state.clone())
        .oneshot(ipn_request(&query, "113.160.92.10:443"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["RspCode"], "01");
}

#[tokio::test]
async fn test_ipn_from_outside_the_allow_list_is_forbidden() {
    let mut config = test_config();
    config.vnpay.ipn_allowed_ips = parse_allowed_ips("113.160.92.0/24").unwrap();
    let app = test_app(config);
    app.orders.insert(order(5, 10, OrderStatus::AwaitingPayment, 50_000));
    let query = to_query(&signed_callback(5, 50_000, "00"));

    let blocked = create_app(app.state.clone())
        .oneshot(ipn_request(&query, "203.0.113.9:5000"))
        .await
        .unwrap();
    assert_eq!(blocked.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.orders.snapshot(5).unwrap().status, OrderStatus::AwaitingPayment);

    let allowed = create_app(app.state.clone())
        .oneshot(ipn_request(&query, "113.160.92.44:5000"))
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
    assert_eq!(app.orders.snapshot(5).unwrap().status, OrderStatus::Paid);
}

#[tokio::test]
async fn test_return_page_reports_result_for_the_customer() {
    let app = test_app(test_config());
    app.orders.insert(order(6, 10, OrderStatus::AwaitingPayment, 75_000));

    let query = to_query(&signed_callback(6, 75_000, "00"));
    let response = create_app(app.state.clone())
        .oneshot(
            Request::builder()
                .uri(format!("/api/payment/vnpay/return?{}", query))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["code"], "00");
    assert_eq!(body["order_id"], 6);
    assert_eq!(app.orders.snapshot(6).unwrap().status, OrderStatus::Paid);
}

#[tokio::test]
async fn test_return_page_with_bad_signature_changes_nothing() {
    let app = test_app(test_config());
    app.orders.insert(order(7, 10, OrderStatus::AwaitingPayment, 75_000));

    let mut params = signed_callback(7, 75_000, "00");
    params.insert("vnp_SecureHash".to_string(), "00ff".repeat(32));
    let response = create_app(app.state.clone())
        .oneshot(
            Request::builder()
                .uri(format!("/api/payment/vnpay/return?{}", to_query(&params)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "97");
    assert_eq!(app.orders.snapshot(7).unwrap().status, OrderStatus::AwaitingPayment);
}
