pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod payment;
pub mod ports;
pub mod services;
pub mod use_cases;
pub mod utils;
pub mod validation;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

use crate::adapters::{PostgresOrderEvents, PostgresOrderRepository};
use crate::config::Config;
use crate::middleware::ip_filter::IpFilterLayer;
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::middleware::request_logger::request_logger_middleware;
use crate::ports::{OrderEvents, OrderRepository};
use crate::services::auth::JwtKeys;
use crate::services::{Mailer, RateLimiter, TtlCache};
use crate::use_cases::{ConfirmPayment, UpdateOrderStatus};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub jwt: JwtKeys,
    pub orders: Arc<dyn OrderRepository>,
    pub events: Arc<dyn OrderEvents>,
    pub rate_limiter: RateLimiter,
    pub product_cache: TtlCache<serde_json::Value>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// State wired to the Postgres order adapters.
    pub fn new(db: sqlx::PgPool, config: Config, mailer: Arc<dyn Mailer>) -> Self {
        let orders: Arc<dyn OrderRepository> = Arc::new(PostgresOrderRepository::new(db.clone()));
        let events: Arc<dyn OrderEvents> = Arc::new(PostgresOrderEvents::new(db.clone()));
        Self::with_ports(db, config, mailer, orders, events)
    }

    pub fn with_ports(
        db: sqlx::PgPool,
        config: Config,
        mailer: Arc<dyn Mailer>,
        orders: Arc<dyn OrderRepository>,
        events: Arc<dyn OrderEvents>,
    ) -> Self {
        let jwt = JwtKeys::new(&config.jwt_secret, config.jwt_ttl_hours);
        let rate_limiter = RateLimiter::new(
            config.rate_limit.max_attempts,
            Duration::from_secs(config.rate_limit.window_secs),
        );
        let product_cache = TtlCache::new(Duration::from_secs(config.product_cache_ttl_secs));

        Self {
            db,
            config: Arc::new(config),
            jwt,
            orders,
            events,
            rate_limiter,
            product_cache,
            mailer,
        }
    }

    pub fn update_order_status(&self) -> UpdateOrderStatus {
        UpdateOrderStatus::new(self.orders.clone(), self.events.clone())
    }

    pub fn confirm_payment(&self) -> ConfirmPayment {
        ConfirmPayment::new(self.orders.clone(), self.events.clone())
    }
}

pub fn create_app(state: AppState) -> Router {
    use handlers::{admin, auth, cart, discounts, export, notifications, orders, payment, products};

    let limited = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/forgot-password", post(auth::forgot_password))
        .route("/api/auth/reset-password", post(auth::reset_password))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    let ipn = Router::new()
        .route("/api/payment/vnpay/ipn", get(payment::vnpay_ipn))
        .route_layer(IpFilterLayer::new(
            state.config.vnpay.ipn_allowed_ips.clone(),
            state.config.trusted_proxy_depth,
        ));

    let admin_routes = Router::new()
        .route("/api/admin/products", post(products::create_product))
        .route(
            "/api/admin/products/:id",
            put(products::update_product).delete(products::delete_product),
        )
        .route(
            "/api/admin/discounts",
            get(discounts::list_discounts).post(discounts::create_discount),
        )
        .route(
            "/api/admin/discounts/:id",
            put(discounts::update_discount).delete(discounts::delete_discount),
        )
        .route("/api/admin/orders", get(orders::admin_list_orders))
        .route("/api/admin/inventory", get(admin::inventory))
        .route("/api/admin/inventory/:id", put(admin::set_stock))
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/admin/revenue", get(admin::revenue))
        .route("/api/admin/export/orders", get(export::export_orders))
        .route("/api/admin/export/products", get(export::export_products));

    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me).put(auth::update_me))
        .route("/api/auth/change-password", post(auth::change_password))
        .route("/api/auth/verify-email", get(auth::verify_email))
        .route("/api/products", get(products::list_products))
        .route("/api/products/:id", get(products::get_product))
        .route(
            "/api/products/:id/reviews",
            get(products::list_reviews).post(products::create_review),
        )
        .route("/api/categories", get(products::list_categories))
        .route(
            "/api/cart",
            get(cart::get_cart).post(cart::add_to_cart).delete(cart::clear_cart),
        )
        .route(
            "/api/cart/:product_id",
            put(cart::update_cart_item).delete(cart::remove_cart_item),
        )
        .route(
            "/api/wishlist",
            get(cart::get_wishlist).post(cart::add_to_wishlist),
        )
        .route(
            "/api/wishlist/:product_id",
            axum::routing::delete(cart::remove_from_wishlist),
        )
        .route("/api/discounts/validate", post(discounts::validate_code))
        .route(
            "/api/orders",
            get(orders::list_my_orders).post(orders::create_order),
        )
        .route("/api/orders/:id", get(orders::get_order))
        .route("/api/orders/:id/status", put(orders::update_status))
        .route("/api/orders/:id/cancel", post(orders::cancel_order))
        .route("/api/payment/vnpay/create", post(payment::create_payment))
        .route("/api/payment/vnpay/return", get(payment::vnpay_return))
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/read-all", put(notifications::mark_all_read))
        .route("/api/notifications/:id/read", put(notifications::mark_read))
        .merge(limited)
        .merge(ipn)
        .merge(admin_routes)
        .layer(cors)
        .layer(axum_middleware::from_fn(request_logger_middleware))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    match HeaderValue::from_str(config.public_base_url.trim_end_matches('/')) {
        Ok(origin) => base.allow_origin(origin),
        Err(e) => {
            tracing::warn!(error = %e, "PUBLIC_BASE_URL is not a valid origin; cross-origin requests disabled");
            base
        }
    }
}
