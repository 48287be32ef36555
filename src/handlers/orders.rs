use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;

use crate::db::{
    models::OrderItem,
    orders::{self, CheckoutRequest},
};
use crate::domain::{parse_order_id, Order, OrderStatus, OrderStatusLog, PaymentMethod};
use crate::error::AppError;
use crate::handlers::{Page, Pagination};
use crate::middleware::{
    auth::{AdminUser, AuthUser},
    ip_filter::client_ip,
};
use crate::payment::vnpay::{self, PaymentRequest};
use crate::services::{
    inventory,
    notifications::{self, KIND_ORDER},
};
use crate::use_cases::{Actor, UpdateStatusInput};
use crate::validation::{self, ADDRESS_MAX_LEN, NAME_MAX_LEN, NOTE_MAX_LEN};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub shipping_name: String,
    pub shipping_phone: String,
    pub shipping_address: String,
    pub note: Option<String>,
    pub payment_method: String,
    pub discount_code: Option<String>,
    pub bank_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminOrderQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub history: Vec<OrderStatusLog>,
}

/// Address the gateway records as the payer's.
pub(crate) fn payer_ip(state: &AppState, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let mut extensions = axum::http::Extensions::new();
    if let Some(peer) = peer {
        extensions.insert(ConnectInfo(peer));
    }
    client_ip(headers, &extensions, state.config.trusted_proxy_depth)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

impl CreateOrderRequest {
    fn into_checkout(self, user_id: i64) -> Result<CheckoutRequest, AppError> {
        let note = match self.note.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(note) => Some(validation::validate_text("note", note, NOTE_MAX_LEN)?),
            None => None,
        };
        Ok(CheckoutRequest {
            user_id,
            shipping_name: validation::validate_text("shipping_name", &self.shipping_name, NAME_MAX_LEN)?,
            shipping_phone: validation::normalize_phone(&self.shipping_phone)?,
            shipping_address: validation::validate_text(
                "shipping_address",
                &self.shipping_address,
                ADDRESS_MAX_LEN,
            )?,
            note,
            payment_method: self.payment_method.parse::<PaymentMethod>()?,
            discount_code: self.discount_code.filter(|c| !c.trim().is_empty()),
        })
    }
}

pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let bank_code = body.bank_code.clone();
    let request = body.into_checkout(user.id)?;
    let outcome = orders::checkout(&state.db, &request).await?;

    let (title, message) = notifications::order_status_message(outcome.order.id, outcome.order.status);
    notifications::notify_best_effort(&state.db, user.id, KIND_ORDER, &title, &message).await;

    let product_ids: Vec<i64> = outcome.items.iter().map(|item| item.product_id).collect();
    let pool = state.db.clone();
    let threshold = state.config.low_stock_threshold;
    tokio::spawn(async move {
        inventory::alert_low_stock(&pool, &product_ids, threshold).await;
    });

    let payment_url = match request.payment_method {
        PaymentMethod::Vnpay => {
            let ip = payer_ip(&state, &headers, peer.map(|ConnectInfo(addr)| addr));
            Some(vnpay::build_payment_url(
                &state.config.vnpay,
                &PaymentRequest {
                    order_id: outcome.order.id,
                    total: &outcome.order.total,
                    client_ip: &ip,
                    bank_code: bank_code.as_deref(),
                    locale: None,
                },
                Utc::now(),
            )?)
        }
        PaymentMethod::Cod => None,
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "order": outcome.order,
            "items": outcome.items,
            "payment_url": payment_url,
        })),
    ))
}

pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Page<Order>>, AppError> {
    let (page, limit, offset) = pagination.resolve();
    let (items, total) = orders::list_orders(&state.db, Some(user.id), None, limit, offset).await?;
    Ok(Json(Page {
        items,
        page,
        limit,
        total,
    }))
}

pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(raw_id): Path<String>,
) -> Result<Json<OrderDetail>, AppError> {
    let id = parse_order_id(&raw_id)?;
    let order = state.orders.get_by_id(id).await?;
    if !user.is_admin() && !order.is_owned_by(user.id) {
        return Err(AppError::NotFound(format!("order {}", id)));
    }

    let items = orders::order_items(&state.db, id).await?;
    let history = state.orders.status_logs(id).await?;
    Ok(Json(OrderDetail {
        order,
        items,
        history,
    }))
}

fn actor_for(user: &AuthUser) -> Actor {
    if user.is_admin() {
        Actor::Admin(user.id)
    } else {
        Actor::Customer(user.id)
    }
}

pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(raw_id): Path<String>,
    Json(body): Json<StatusUpdateRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .update_order_status()
        .execute(UpdateStatusInput {
            order_id: raw_id,
            status: body.status,
            reason: body.reason,
            actor: actor_for(&user),
        })
        .await?;
    Ok(Json(order))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(raw_id): Path<String>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Order>, AppError> {
    let reason = body.and_then(|Json(body)| body.reason);
    let order = state
        .update_order_status()
        .execute(UpdateStatusInput {
            order_id: raw_id,
            status: OrderStatus::Cancelled.as_str().to_string(),
            reason,
            actor: actor_for(&user),
        })
        .await?;
    Ok(Json(order))
}

pub async fn admin_list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<AdminOrderQuery>,
) -> Result<Json<Page<Order>>, AppError> {
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<OrderStatus>()?),
        None => None,
    };
    let (page, limit, offset) = Pagination {
        page: query.page,
        limit: query.limit,
    }
    .resolve();

    let (items, total) = orders::list_orders(&state.db, None, status, limit, offset).await?;
    Ok(Json(Page {
        items,
        page,
        limit,
        total,
    }))
}
