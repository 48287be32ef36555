use sqlx::PgPool;

use crate::db::models::Notification;
use crate::domain::OrderStatus;

pub const KIND_ORDER: &str = "order";
pub const KIND_PAYMENT: &str = "payment";
pub const KIND_INVENTORY: &str = "inventory";
pub const KIND_LOYALTY: &str = "loyalty";

pub async fn notify(
    pool: &PgPool,
    user_id: i64,
    kind: &str,
    title: &str,
    message: &str,
) -> Result<Notification, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        r#"
        INSERT INTO notifications (user_id, kind, title, message)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_id, kind, title, message, is_read, created_at
        "#,
    )
    .bind(user_id)
    .bind(kind)
    .bind(title)
    .bind(message)
    .fetch_one(pool)
    .await
}

/// Fans a notification out to every admin account. Returns the number of rows written.
pub async fn notify_admins(
    pool: &PgPool,
    kind: &str,
    title: &str,
    message: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, kind, title, message)
        SELECT id, $1, $2, $3 FROM users WHERE role = 'admin'
        "#,
    )
    .bind(kind)
    .bind(title)
    .bind(message)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn notify_best_effort(pool: &PgPool, user_id: i64, kind: &str, title: &str, message: &str) {
    if let Err(e) = notify(pool, user_id, kind, title, message).await {
        tracing::warn!(user_id, kind, error = %e, "failed to store notification");
    }
}

/// Title and body shown to the customer when their order changes status.
pub fn order_status_message(order_id: i64, status: OrderStatus) -> (String, String) {
    let title = format!("Order #{} update", order_id);
    let body = match status {
        OrderStatus::Pending => format!("Order #{} has been received and is awaiting confirmation.", order_id),
        OrderStatus::AwaitingPayment => format!("Order #{} is waiting for online payment.", order_id),
        OrderStatus::Paid => format!("Payment for order #{} was received. Thank you!", order_id),
        OrderStatus::Shipping => format!("Order #{} is on its way.", order_id),
        OrderStatus::Delivered => format!("Order #{} has been delivered.", order_id),
        OrderStatus::Completed => format!("Order #{} is complete. Enjoy your meal!", order_id),
        OrderStatus::Cancelled => format!("Order #{} has been cancelled.", order_id),
    };
    (title, body)
}

pub async fn list_for_user(
    pool: &PgPool,
    user_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        "SELECT id, user_id, kind, title, message, is_read, created_at
         FROM notifications WHERE user_id = $1
         ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn unread_count(pool: &PgPool, user_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

/// Marks one notification read. Returns false when it does not belong to the user.
pub async fn mark_read(pool: &PgPool, user_id: i64, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_all_read(pool: &PgPool, user_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
