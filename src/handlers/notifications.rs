use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::handlers::Pagination;
use crate::middleware::auth::AuthUser;
use crate::services::notifications;
use crate::AppState;

pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Value>, AppError> {
    let (page, limit, offset) = pagination.resolve();
    let items = notifications::list_for_user(&state.db, user.id, limit, offset).await?;
    let unread = notifications::unread_count(&state.db, user.id).await?;

    Ok(Json(json!({
        "items": items,
        "unread_count": unread,
        "page": page,
        "limit": limit,
    })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    if !notifications::mark_read(&state.db, user.id, id).await? {
        return Err(AppError::NotFound(format!("Notification {} not found", id)));
    }
    Ok(Json(json!({ "id": id, "is_read": true })))
}

pub async fn mark_all_read(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>, AppError> {
    let updated = notifications::mark_all_read(&state.db, user.id).await?;
    Ok(Json(json!({ "updated": updated })))
}
