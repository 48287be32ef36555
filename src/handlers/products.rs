use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::{self, models::Product, queries};
use crate::error::AppError;
use crate::handlers::{Page, Pagination};
use crate::middleware::auth::{AdminUser, AuthUser};
use crate::validation::{self, NAME_MAX_LEN, NOTE_MAX_LEN};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub q: Option<String>,
    pub min_price: Option<BigDecimal>,
    pub max_price: Option<BigDecimal>,
    pub sort: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ProductQuery {
    fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
        }
    }

    fn into_filter(self) -> Result<queries::ProductFilter, AppError> {
        if let (Some(min), Some(max)) = (&self.min_price, &self.max_price) {
            if min > max {
                return Err(AppError::Validation(
                    "min_price: must not exceed max_price".to_string(),
                ));
            }
        }
        let (_, limit, offset) = self.pagination().resolve();
        Ok(queries::ProductFilter {
            category: non_empty(self.category),
            search: non_empty(self.q),
            min_price: self.min_price,
            max_price: self.max_price,
            sort: queries::ProductSort::parse(self.sort.as_deref()),
            limit,
            offset,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Cache key built from the normalized filter so equivalent URLs share an entry.
fn cache_key(filter: &queries::ProductFilter) -> String {
    format!(
        "products|{}|{}|{}|{}|{:?}|{}|{}",
        filter.category.as_deref().unwrap_or(""),
        filter.search.as_deref().unwrap_or("").to_lowercase(),
        filter.min_price.as_ref().map(ToString::to_string).unwrap_or_default(),
        filter.max_price.as_ref().map(ToString::to_string).unwrap_or_default(),
        filter.sort,
        filter.limit,
        filter.offset,
    )
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Value>, AppError> {
    let (page, _, _) = query.pagination().resolve();
    let filter = query.into_filter()?;
    let key = cache_key(&filter);

    if let Some(cached) = state.product_cache.get(&key).await {
        return Ok(Json(cached));
    }

    let (items, total) = queries::list_products(&state.db, &filter).await?;
    let body = serde_json::to_value(Page {
        items,
        page,
        limit: filter.limit,
        total,
    })
    .map_err(|e| AppError::Internal(format!("failed to encode product page: {}", e)))?;

    state.product_cache.insert(key, body.clone()).await;
    Ok(Json(body))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let product = queries::get_product_with_rating(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {} not found", id)))?;
    Ok(Json(product))
}

pub async fn list_categories(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let categories = queries::list_categories(&state.db).await?;
    Ok(Json(json!({ "categories": categories })))
}

fn validated_product(mut input: queries::ProductInput) -> Result<(String, queries::ProductInput), AppError> {
    input.name = validation::validate_text("name", &input.name, NAME_MAX_LEN)?;
    input.category = validation::validate_text("category", &input.category, 60)?.to_lowercase();
    input.unit = validation::validate_text("unit", &input.unit, 20)?;
    validation::validate_non_negative_amount("price", &input.price)?;
    if input.stock < 0 {
        return Err(validation::ValidationError::new("stock", "must not be negative").into());
    }
    if let Some(description) = &input.description {
        validation::validate_max_len("description", description, NOTE_MAX_LEN * 5)?;
    }

    let slug = validation::slugify(&input.name);
    if slug.is_empty() {
        return Err(validation::ValidationError::new("name", "must contain letters or digits").into());
    }
    Ok((slug, input))
}

fn map_slug_conflict(e: sqlx::Error) -> AppError {
    if db::is_unique_violation(&e) {
        AppError::Conflict("A product with this name already exists".to_string())
    } else {
        AppError::Database(e)
    }
}

pub async fn create_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(body): Json<queries::ProductInput>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let (slug, input) = validated_product(body)?;
    let product = queries::insert_product(&state.db, &slug, &input)
        .await
        .map_err(map_slug_conflict)?;

    state.product_cache.invalidate_all().await;
    tracing::info!(product_id = product.id, admin_id = admin.id, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<queries::ProductInput>,
) -> Result<Json<Product>, AppError> {
    let (slug, input) = validated_product(body)?;
    let product = queries::update_product(&state.db, id, &slug, &input)
        .await
        .map_err(map_slug_conflict)?
        .ok_or_else(|| AppError::NotFound(format!("Product {} not found", id)))?;

    state.product_cache.invalidate_all().await;
    tracing::info!(product_id = id, admin_id = admin.id, "product updated");
    Ok(Json(product))
}

/// Soft delete: the row stays for order history, it just leaves the catalog.
pub async fn delete_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !queries::deactivate_product(&state.db, id).await? {
        return Err(AppError::NotFound(format!("Product {} not found", id)));
    }

    state.product_cache.invalidate_all().await;
    tracing::info!(product_id = id, admin_id = admin.id, "product deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: i16,
    pub comment: Option<String>,
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let reviews = queries::reviews_for_product(&state.db, product_id).await?;
    Ok(Json(json!({ "reviews": reviews })))
}

pub async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<i64>,
    Json(body): Json<ReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_rating(body.rating)?;
    let comment = match body.comment.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(comment) => Some(validation::validate_text("comment", comment, NOTE_MAX_LEN)?),
        None => None,
    };

    queries::get_product_with_rating(&state.db, product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))?;

    let review = queries::insert_review(&state.db, user.id, product_id, body.rating, comment.as_deref())
        .await
        .map_err(|e| {
            if db::is_unique_violation(&e) {
                AppError::Conflict("You have already reviewed this product".to_string())
            } else {
                AppError::Database(e)
            }
        })?;

    state.product_cache.invalidate_all().await;
    Ok((StatusCode::CREATED, Json(review)))
}
