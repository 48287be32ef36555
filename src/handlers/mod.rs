pub mod admin;
pub mod auth;
pub mod cart;
pub mod discounts;
pub mod export;
pub mod notifications;
pub mod orders;
pub mod payment;
pub mod products;

use crate::error::AppError;
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl Pagination {
    /// `(page, limit, offset)` with page >= 1 and limit clamped to 1..=MAX_PAGE_SIZE.
    pub fn resolve(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        (page, limit, (page - 1) * limit)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub(crate) fn parse_date(field: &str, raw: &str) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AppError::Validation(format!("{}: '{}' is not a valid date", field, raw)))
}

/// Resolves an optional `from`/`to` pair into a half-open range. A bare
/// `to` date covers the whole day.
pub(crate) fn date_range(
    from: Option<&str>,
    to: Option<&str>,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), AppError> {
    let from = from.filter(|v| !v.trim().is_empty()).map(|v| parse_date("from", v)).transpose()?;
    let to = match to.filter(|v| !v.trim().is_empty()) {
        Some(raw) => {
            let parsed = parse_date("to", raw)?;
            Some(if raw.trim().len() == 10 {
                parsed + chrono::Duration::days(1)
            } else {
                parsed
            })
        }
        None => None,
    };

    if let (Some(from), Some(to)) = (from, to) {
        if from >= to {
            return Err(AppError::Validation("from: must be before to".to_string()));
        }
    }
    Ok((from, to))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DbPoolStats {
    pub active_connections: u32,
    pub idle_connections: u32,
    pub max_connections: u32,
    pub usage_percent: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub db: String,
    pub db_pool: DbPoolStats,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_connected = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();

    let pool = &state.db;
    let active_connections = pool.size();
    let max_connections = pool.options().get_max_connections();
    let db_pool = DbPoolStats {
        active_connections,
        idle_connections: pool.num_idle() as u32,
        max_connections,
        usage_percent: (active_connections as f32 / max_connections.max(1) as f32) * 100.0,
    };

    let (status_code, status, db) = if db_connected {
        (StatusCode::OK, "healthy", "connected")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", "disconnected")
    };

    (
        status_code,
        Json(HealthStatus {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            db: db.to_string(),
            db_pool,
        }),
    )
}
