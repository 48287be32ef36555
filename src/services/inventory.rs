use sqlx::PgPool;

use crate::db::models::Product;
use crate::services::notifications::{self, KIND_INVENTORY};

pub fn is_low_stock(stock: i32, threshold: i32) -> bool {
    stock <= threshold
}

pub async fn low_stock_products(pool: &PgPool, threshold: i32) -> Result<Vec<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE is_active AND stock <= $1 ORDER BY stock ASC, name ASC",
    )
    .bind(threshold)
    .fetch_all(pool)
    .await
}

pub async fn set_stock(pool: &PgPool, product_id: i64, stock: i32) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(
        "UPDATE products SET stock = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(stock)
    .bind(product_id)
    .fetch_optional(pool)
    .await
}

/// Puts the quantities of a cancelled order back on the shelf.
pub async fn restock_order(pool: &PgPool, order_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE products p
        SET stock = p.stock + oi.quantity, updated_at = NOW()
        FROM order_items oi
        WHERE oi.order_id = $1 AND oi.product_id = p.id
        "#,
    )
    .bind(order_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Checks the given products against the threshold and tells the admins
/// about any that ran low. Failures are logged only.
pub async fn alert_low_stock(pool: &PgPool, product_ids: &[i64], threshold: i32) {
    let rows: Result<Vec<(i64, String, i32)>, sqlx::Error> =
        sqlx::query_as("SELECT id, name, stock FROM products WHERE id = ANY($1)")
            .bind(product_ids)
            .fetch_all(pool)
            .await;

    let rows = match rows {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(error = %e, "low stock check failed");
            return;
        }
    };

    for (id, name, stock) in rows.into_iter().filter(|(_, _, stock)| is_low_stock(*stock, threshold)) {
        tracing::info!(product_id = id, stock, "product stock at or below threshold");
        let message = format!("{} (#{}) has {} left in stock.", name, id, stock);
        if let Err(e) =
            notifications::notify_admins(pool, KIND_INVENTORY, "Low stock", &message).await
        {
            tracing::warn!(product_id = id, error = %e, "failed to notify admins about low stock");
        }
    }
}
