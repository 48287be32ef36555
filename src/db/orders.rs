//! Order queries that sit outside the status workflow: checkout, listings,
//! line items and admin reporting.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, QueryBuilder};

use crate::adapters::postgres_order_repository::{OrderRow, ORDER_COLUMNS};
use crate::db::models::OrderItem;
use crate::domain::{Order, OrderStatus, PaymentMethod};
use crate::error::AppError;
use crate::services::discounts;

pub const FREE_SHIPPING_THRESHOLD: i64 = 500_000;
pub const FLAT_SHIPPING_FEE: i64 = 30_000;

/// Shipping is charged on the amount left after discounts.
pub fn shipping_fee_for(discounted_subtotal: &BigDecimal) -> BigDecimal {
    if discounted_subtotal >= &BigDecimal::from(FREE_SHIPPING_THRESHOLD) {
        BigDecimal::from(0)
    } else {
        BigDecimal::from(FLAT_SHIPPING_FEE)
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: i64,
    pub shipping_name: String,
    pub shipping_phone: String,
    pub shipping_address: String,
    pub note: Option<String>,
    pub payment_method: PaymentMethod,
    pub discount_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, FromRow)]
struct LockedCartLine {
    product_id: i64,
    quantity: i32,
    name: String,
    price: BigDecimal,
    stock: i32,
    is_active: bool,
}

/// Turns the user's cart into an order in a single transaction.
///
/// Product rows are locked for the duration, so two concurrent checkouts can
/// never both take the last unit.
pub async fn checkout(pool: &PgPool, request: &CheckoutRequest) -> Result<CheckoutOutcome, AppError> {
    let mut tx = pool.begin().await?;

    let lines = sqlx::query_as::<_, LockedCartLine>(
        r#"
        SELECT c.product_id, c.quantity, p.name, p.price, p.stock, p.is_active
        FROM cart_items c JOIN products p ON p.id = c.product_id
        WHERE c.user_id = $1
        ORDER BY p.id
        FOR UPDATE OF p
        "#,
    )
    .bind(request.user_id)
    .fetch_all(&mut *tx)
    .await?;

    if lines.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".to_string()));
    }

    let mut subtotal = BigDecimal::from(0);
    for line in &lines {
        if !line.is_active {
            return Err(AppError::BadRequest(format!(
                "{} is no longer available",
                line.name
            )));
        }
        if line.stock < line.quantity {
            return Err(AppError::Conflict(format!(
                "Only {} left in stock for {}",
                line.stock, line.name
            )));
        }
        subtotal += &line.price * BigDecimal::from(line.quantity);
    }

    let now = Utc::now();
    let mut discount_amount = BigDecimal::from(0);
    let mut applied_code = None;
    if let Some(raw) = &request.discount_code {
        let code = discounts::normalize_code(raw)?;
        let found = discounts::lock_by_code(&mut tx, &code)
            .await?
            .ok_or_else(|| AppError::Validation("discount_code: does not exist".to_string()))?;
        discount_amount = discounts::compute_discount(&found, &subtotal, now)?;
        discounts::increment_usage(&mut tx, found.id).await?;
        applied_code = Some(found.code);
    }

    let discounted = &subtotal - &discount_amount;
    let shipping_fee = shipping_fee_for(&discounted);
    let total = &discounted + &shipping_fee;
    let status = request.payment_method.initial_status();

    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r#"
        INSERT INTO orders (
            user_id, subtotal, discount_amount, shipping_fee, total, discount_code, status,
            payment_method, shipping_name, shipping_phone, shipping_address, note
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING {}
        "#,
        ORDER_COLUMNS
    ))
    .bind(request.user_id)
    .bind(&subtotal)
    .bind(&discount_amount)
    .bind(&shipping_fee)
    .bind(&total)
    .bind(&applied_code)
    .bind(status.as_str())
    .bind(request.payment_method.as_str())
    .bind(&request.shipping_name)
    .bind(&request.shipping_phone)
    .bind(&request.shipping_address)
    .bind(&request.note)
    .fetch_one(&mut *tx)
    .await?;
    let order = row.into_domain()?;

    let mut items = Vec::with_capacity(lines.len());
    for line in &lines {
        let item = sqlx::query_as::<_, OrderItem>(
            r#"
            INSERT INTO order_items (order_id, product_id, product_name, unit_price, quantity)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(order.id)
        .bind(line.product_id)
        .bind(&line.name)
        .bind(&line.price)
        .bind(line.quantity)
        .fetch_one(&mut *tx)
        .await?;
        items.push(item);

        sqlx::query("UPDATE products SET stock = stock - $1, updated_at = NOW() WHERE id = $2")
            .bind(line.quantity)
            .bind(line.product_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(request.user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO order_status_logs (order_id, status, reason, changed_by) VALUES ($1, $2, $3, $4)",
    )
    .bind(order.id)
    .bind(status.as_str())
    .bind(format!("Order placed with {}", request.payment_method.as_str()))
    .bind(request.user_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        order_id = order.id,
        user_id = request.user_id,
        total = %order.total,
        status = %order.status,
        "order placed"
    );

    Ok(CheckoutOutcome { order, items })
}

pub async fn order_items(pool: &PgPool, order_id: i64) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(pool)
        .await
}

/// Orders newest first, optionally narrowed to one user and/or status.
pub async fn list_orders(
    pool: &PgPool,
    user_id: Option<i64>,
    status: Option<OrderStatus>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Order>, i64), AppError> {
    fn push_filters<'a>(
        builder: &mut QueryBuilder<'a, sqlx::Postgres>,
        user_id: Option<i64>,
        status: Option<OrderStatus>,
    ) {
        builder.push(" WHERE TRUE");
        if let Some(user_id) = user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(status) = status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
    }

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM orders");
    push_filters(&mut count, user_id, status);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut query = QueryBuilder::new(format!("SELECT {} FROM orders", ORDER_COLUMNS));
    push_filters(&mut query, user_id, status);
    query
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = query.build_query_as::<OrderRow>().fetch_all(pool).await?;
    let orders = rows
        .into_iter()
        .map(OrderRow::into_domain)
        .collect::<Result<Vec<_>, _>>()?;

    Ok((orders, total))
}

// --- Reporting ---

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub revenue: BigDecimal,
    pub revenue_orders: i64,
    pub orders_by_status: Vec<StatusCount>,
    pub total_orders: i64,
    pub total_users: i64,
    pub active_products: i64,
}

fn revenue_statuses() -> Vec<String> {
    OrderStatus::ALL
        .iter()
        .filter(|status| status.is_revenue())
        .map(|status| status.as_str().to_string())
        .collect()
}

pub async fn store_stats(pool: &PgPool) -> Result<StoreStats, sqlx::Error> {
    let (revenue, revenue_orders): (Option<BigDecimal>, i64) = sqlx::query_as(
        "SELECT SUM(total), COUNT(*) FROM orders WHERE status = ANY($1)",
    )
    .bind(revenue_statuses())
    .fetch_one(pool)
    .await?;

    let orders_by_status = sqlx::query_as::<_, StatusCount>(
        "SELECT status, COUNT(*) AS count FROM orders GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await?;

    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    let active_products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active")
        .fetch_one(pool)
        .await?;

    Ok(StoreStats {
        revenue: revenue.unwrap_or_else(|| BigDecimal::from(0)),
        revenue_orders,
        total_orders: orders_by_status.iter().map(|row| row.count).sum(),
        orders_by_status,
        total_users,
        active_products,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevenueGroup {
    Day,
    Month,
}

impl RevenueGroup {
    pub fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.map(str::trim) {
            None | Some("") | Some("day") => Ok(RevenueGroup::Day),
            Some("month") => Ok(RevenueGroup::Month),
            Some(other) => Err(AppError::Validation(format!(
                "group: '{}' must be one of day, month",
                other
            ))),
        }
    }

    fn trunc_unit(&self) -> &'static str {
        match self {
            RevenueGroup::Day => "day",
            RevenueGroup::Month => "month",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RevenuePoint {
    pub period: DateTime<Utc>,
    pub revenue: BigDecimal,
    pub orders: i64,
}

/// Revenue bucketed by day or month over `[from, to)`.
pub async fn revenue_series(
    pool: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    group: RevenueGroup,
) -> Result<Vec<RevenuePoint>, sqlx::Error> {
    sqlx::query_as::<_, RevenuePoint>(
        r#"
        SELECT date_trunc($1, created_at) AS period, SUM(total) AS revenue, COUNT(*) AS orders
        FROM orders
        WHERE status = ANY($2) AND created_at >= $3 AND created_at < $4
        GROUP BY period
        ORDER BY period
        "#,
    )
    .bind(group.trunc_unit())
    .bind(revenue_statuses())
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
}
