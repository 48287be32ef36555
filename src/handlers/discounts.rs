use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::db::{self, models::DiscountCode, orders::shipping_fee_for};
use crate::error::AppError;
use crate::middleware::auth::{AdminUser, AuthUser};
use crate::services::discounts::{self, DiscountInput};
use crate::validation;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub code: String,
    pub subtotal: BigDecimal,
}

/// Preview of what a code would take off a given subtotal. Nothing is reserved.
pub async fn validate_code(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(body): Json<ValidateRequest>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_non_negative_amount("subtotal", &body.subtotal)?;
    let code = discounts::normalize_code(&body.code)?;
    let found = discounts::find_by_code(&state.db, &code)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Discount code {} not found", code)))?;

    let discount = discounts::compute_discount(&found, &body.subtotal, Utc::now())?;
    let discounted = &body.subtotal - &discount;
    let shipping_fee = shipping_fee_for(&discounted);
    let total = &discounted + &shipping_fee;

    Ok(Json(json!({
        "code": found.code,
        "discount_type": found.discount_type,
        "discount": discount,
        "shipping_fee": shipping_fee,
        "total": total,
    })))
}

pub async fn list_discounts(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<DiscountCode>>, AppError> {
    Ok(Json(discounts::list(&state.db).await?))
}

fn map_code_conflict(e: sqlx::Error) -> AppError {
    if db::is_unique_violation(&e) {
        AppError::Conflict("Discount code already exists".to_string())
    } else {
        AppError::Database(e)
    }
}

pub async fn create_discount(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(body): Json<DiscountInput>,
) -> Result<(StatusCode, Json<DiscountCode>), AppError> {
    let input = body.validated()?;
    let created = discounts::create(&state.db, &input)
        .await
        .map_err(map_code_conflict)?;

    tracing::info!(discount_id = created.id, code = %created.code, admin_id = admin.id, "discount code created");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_discount(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<DiscountInput>,
) -> Result<Json<DiscountCode>, AppError> {
    let input = body.validated()?;
    let updated = discounts::update(&state.db, id, &input)
        .await
        .map_err(map_code_conflict)?
        .ok_or_else(|| AppError::NotFound(format!("Discount {} not found", id)))?;

    tracing::info!(discount_id = id, admin_id = admin.id, "discount code updated");
    Ok(Json(updated))
}

pub async fn delete_discount(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !discounts::delete(&state.db, id).await? {
        return Err(AppError::NotFound(format!("Discount {} not found", id)));
    }
    tracing::info!(discount_id = id, admin_id = admin.id, "discount code deleted");
    Ok(StatusCode::NO_CONTENT)
}
