use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{PgPool, Postgres, Transaction};

use crate::db::models::DiscountCode;
use crate::validation::{self, ValidationError};

pub const TYPE_PERCENTAGE: &str = "percentage";
pub const TYPE_FIXED: &str = "fixed";

/// Discount granted by `code` on `subtotal`, or why it does not apply.
pub fn compute_discount(
    code: &DiscountCode,
    subtotal: &BigDecimal,
    now: DateTime<Utc>,
) -> Result<BigDecimal, ValidationError> {
    if !code.is_active {
        return Err(ValidationError::new("discount_code", "is no longer active"));
    }
    if code.expires_at.is_some_and(|expires_at| expires_at <= now) {
        return Err(ValidationError::new("discount_code", "has expired"));
    }
    if code.usage_limit.is_some_and(|limit| code.used_count >= limit) {
        return Err(ValidationError::new("discount_code", "has reached its usage limit"));
    }
    if subtotal < &code.min_order_amount {
        return Err(ValidationError::new(
            "discount_code",
            format!("requires a minimum order of {}", code.min_order_amount),
        ));
    }

    let raw = match code.discount_type.as_str() {
        TYPE_PERCENTAGE => {
            let amount = (subtotal * &code.value / BigDecimal::from(100)).with_scale(0);
            match &code.max_discount {
                Some(cap) if &amount > cap => cap.clone(),
                _ => amount,
            }
        }
        TYPE_FIXED => code.value.clone(),
        other => {
            return Err(ValidationError::new(
                "discount_code",
                format!("has unknown type '{}'", other),
            ))
        }
    };

    Ok(if &raw > subtotal { subtotal.clone() } else { raw })
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscountInput {
    pub code: String,
    pub discount_type: String,
    pub value: BigDecimal,
    #[serde(default)]
    pub min_order_amount: Option<BigDecimal>,
    pub max_discount: Option<BigDecimal>,
    pub usage_limit: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl DiscountInput {
    /// Normalizes the code and checks field ranges.
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        self.code = normalize_code(&self.code)?;
        validation::validate_enum("discount_type", &self.discount_type, &[TYPE_PERCENTAGE, TYPE_FIXED])?;
        validation::validate_positive_amount("value", &self.value)?;
        if self.discount_type == TYPE_PERCENTAGE && self.value > BigDecimal::from(100) {
            return Err(ValidationError::new("value", "percentage must be at most 100"));
        }
        if let Some(min) = &self.min_order_amount {
            validation::validate_non_negative_amount("min_order_amount", min)?;
        }
        if let Some(cap) = &self.max_discount {
            validation::validate_positive_amount("max_discount", cap)?;
        }
        if self.usage_limit.is_some_and(|limit| limit <= 0) {
            return Err(ValidationError::new("usage_limit", "must be greater than zero"));
        }
        Ok(self)
    }
}

pub fn normalize_code(code: &str) -> Result<String, ValidationError> {
    let code = code.trim().to_ascii_uppercase();
    validation::validate_required("code", &code)?;
    validation::validate_max_len("code", &code, 32)?;
    if !code.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-') {
        return Err(ValidationError::new(
            "code",
            "may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(code)
}

pub async fn find_by_code(pool: &PgPool, code: &str) -> Result<Option<DiscountCode>, sqlx::Error> {
    sqlx::query_as::<_, DiscountCode>("SELECT * FROM discount_codes WHERE code = $1")
        .bind(code)
        .fetch_optional(pool)
        .await
}

/// Locks the code row for the rest of the checkout transaction.
pub async fn lock_by_code(
    tx: &mut Transaction<'_, Postgres>,
    code: &str,
) -> Result<Option<DiscountCode>, sqlx::Error> {
    sqlx::query_as::<_, DiscountCode>("SELECT * FROM discount_codes WHERE code = $1 FOR UPDATE")
        .bind(code)
        .fetch_optional(&mut **tx)
        .await
}

pub async fn increment_usage(tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE discount_codes SET used_count = used_count + 1 WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn list(pool: &PgPool) -> Result<Vec<DiscountCode>, sqlx::Error> {
    sqlx::query_as::<_, DiscountCode>("SELECT * FROM discount_codes ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
}

pub async fn create(pool: &PgPool, input: &DiscountInput) -> Result<DiscountCode, sqlx::Error> {
    sqlx::query_as::<_, DiscountCode>(
        r#"
        INSERT INTO discount_codes (
            code, discount_type, value, min_order_amount, max_discount, usage_limit, expires_at, is_active
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(&input.code)
    .bind(&input.discount_type)
    .bind(&input.value)
    .bind(input.min_order_amount.clone().unwrap_or_else(|| BigDecimal::from(0)))
    .bind(&input.max_discount)
    .bind(input.usage_limit)
    .bind(input.expires_at)
    .bind(input.is_active)
    .fetch_one(pool)
    .await
}

pub async fn update(
    pool: &PgPool,
    id: i64,
    input: &DiscountInput,
) -> Result<Option<DiscountCode>, sqlx::Error> {
    sqlx::query_as::<_, DiscountCode>(
        r#"
        UPDATE discount_codes SET
            code = $1, discount_type = $2, value = $3, min_order_amount = $4,
            max_discount = $5, usage_limit = $6, expires_at = $7, is_active = $8
        WHERE id = $9
        RETURNING *
        "#,
    )
    .bind(&input.code)
    .bind(&input.discount_type)
    .bind(&input.value)
    .bind(input.min_order_amount.clone().unwrap_or_else(|| BigDecimal::from(0)))
    .bind(&input.max_discount)
    .bind(input.usage_limit)
    .bind(input.expires_at)
    .bind(input.is_active)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM discount_codes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
