//! Cart and wishlist endpoints. Both are per-user lists keyed by product.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::{models::CartLine, orders::shipping_fee_for, queries};
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::validation;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: i64,
    #[serde(default = "one")]
    pub quantity: i32,
}

fn one() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartLineView>,
    pub subtotal: BigDecimal,
    pub shipping_fee: BigDecimal,
    pub item_count: i64,
}

#[derive(Debug, Serialize)]
pub struct CartLineView {
    #[serde(flatten)]
    pub line: CartLine,
    pub line_total: BigDecimal,
}

impl CartView {
    pub fn from_lines(lines: Vec<CartLine>) -> Self {
        let subtotal = lines
            .iter()
            .fold(BigDecimal::from(0), |acc, line| acc + line.line_total());
        let item_count = lines.iter().map(|line| i64::from(line.quantity)).sum();
        let shipping_fee = if lines.is_empty() {
            BigDecimal::from(0)
        } else {
            shipping_fee_for(&subtotal)
        };

        CartView {
            items: lines
                .into_iter()
                .map(|line| CartLineView {
                    line_total: line.line_total(),
                    line,
                })
                .collect(),
            subtotal,
            shipping_fee,
            item_count,
        }
    }
}

async fn load_cart(state: &AppState, user_id: i64) -> Result<Json<CartView>, AppError> {
    let lines = queries::cart_lines(&state.db, user_id).await?;
    Ok(Json(CartView::from_lines(lines)))
}

/// Checks the product is sellable and has `quantity` units on hand.
async fn ensure_available(state: &AppState, product_id: i64, quantity: i32) -> Result<(), AppError> {
    let product = queries::get_product(&state.db, product_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))?;

    if quantity > product.stock {
        return Err(AppError::Conflict(format!(
            "Only {} left in stock for {}",
            product.stock, product.name
        )));
    }
    Ok(())
}

pub async fn get_cart(State(state): State<AppState>, user: AuthUser) -> Result<Json<CartView>, AppError> {
    load_cart(&state, user.id).await
}

/// Adds to the existing quantity when the product is already in the cart.
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<AddToCartRequest>,
) -> Result<Json<CartView>, AppError> {
    validation::validate_quantity(body.quantity)?;
    let current = queries::cart_quantity(&state.db, user.id, body.product_id).await?;
    let quantity = current.saturating_add(body.quantity);
    validation::validate_quantity(quantity)?;
    ensure_available(&state, body.product_id, quantity).await?;

    queries::set_cart_quantity(&state.db, user.id, body.product_id, quantity).await?;
    load_cart(&state, user.id).await
}

pub async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<i64>,
    Json(body): Json<UpdateCartRequest>,
) -> Result<Json<CartView>, AppError> {
    validation::validate_quantity(body.quantity)?;
    if queries::cart_quantity(&state.db, user.id, product_id).await? == 0 {
        return Err(AppError::NotFound("Product is not in the cart".to_string()));
    }
    ensure_available(&state, product_id, body.quantity).await?;

    queries::set_cart_quantity(&state.db, user.id, product_id, body.quantity).await?;
    load_cart(&state, user.id).await
}

pub async fn remove_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<i64>,
) -> Result<Json<CartView>, AppError> {
    if !queries::remove_cart_item(&state.db, user.id, product_id).await? {
        return Err(AppError::NotFound("Product is not in the cart".to_string()));
    }
    load_cart(&state, user.id).await
}

pub async fn clear_cart(State(state): State<AppState>, user: AuthUser) -> Result<StatusCode, AppError> {
    let removed = queries::clear_cart(&state.db, user.id).await?;
    tracing::debug!(user_id = user.id, removed, "cart cleared");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct WishlistRequest {
    pub product_id: i64,
}

pub async fn get_wishlist(State(state): State<AppState>, user: AuthUser) -> Result<impl IntoResponse, AppError> {
    let items = queries::wishlist(&state.db, user.id).await?;
    Ok(Json(json!({ "items": items })))
}

/// Adding a product twice is not an error.
pub async fn add_to_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<WishlistRequest>,
) -> Result<impl IntoResponse, AppError> {
    queries::get_product(&state.db, body.product_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::NotFound(format!("Product {} not found", body.product_id)))?;

    let added = queries::add_to_wishlist(&state.db, user.id, body.product_id).await?;
    let status = if added { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(json!({ "product_id": body.product_id, "added": added }))))
}

pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !queries::remove_from_wishlist(&state.db, user.id, product_id).await? {
        return Err(AppError::NotFound("Product is not in the wishlist".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
