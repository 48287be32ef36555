use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::{
    models::Product,
    orders::{self, RevenueGroup, RevenuePoint, StoreStats},
};
use crate::error::AppError;
use crate::handlers::date_range;
use crate::middleware::auth::AdminUser;
use crate::services::inventory;
use crate::AppState;

const DEFAULT_REVENUE_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct InventoryQuery {
    pub threshold: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub stock: i32,
}

#[derive(Debug, Deserialize)]
pub struct RevenueQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub group: Option<String>,
}

/// Products at or below the threshold, lowest stock first.
pub async fn inventory(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<InventoryQuery>,
) -> Result<Json<Value>, AppError> {
    let threshold = query.threshold.unwrap_or(state.config.low_stock_threshold);
    if threshold < 0 {
        return Err(AppError::Validation("threshold: must not be negative".to_string()));
    }

    let products = inventory::low_stock_products(&state.db, threshold).await?;
    Ok(Json(json!({ "threshold": threshold, "items": products })))
}

pub async fn set_stock(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<SetStockRequest>,
) -> Result<Json<Product>, AppError> {
    if body.stock < 0 {
        return Err(AppError::Validation("stock: must not be negative".to_string()));
    }

    let product = inventory::set_stock(&state.db, id, body.stock)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {} not found", id)))?;

    state.product_cache.invalidate_all().await;
    tracing::info!(product_id = id, stock = body.stock, admin_id = admin.id, "stock level set");
    Ok(Json(product))
}

pub async fn stats(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<StoreStats>, AppError> {
    Ok(Json(orders::store_stats(&state.db).await?))
}

pub async fn revenue(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<RevenueQuery>,
) -> Result<Json<Vec<RevenuePoint>>, AppError> {
    let group = RevenueGroup::parse(query.group.as_deref())?;
    let (from, to) = date_range(query.from.as_deref(), query.to.as_deref())?;
    let to = to.unwrap_or_else(Utc::now);
    let from = from.unwrap_or_else(|| to - Duration::days(DEFAULT_REVENUE_DAYS));
    if from >= to {
        return Err(AppError::Validation("from: must be before to".to_string()));
    }

    Ok(Json(orders::revenue_series(&state.db, from, to, group).await?))
}
