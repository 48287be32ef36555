//! Postgres implementation of OrderRepository.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{NewStatusLog, Order, OrderStatus, OrderStatusLog, PaymentDetails};
use crate::ports::{OrderRepository, RepositoryError, RepositoryResult};

pub(crate) const ORDER_COLUMNS: &str = "id, user_id, subtotal, discount_amount, shipping_fee, total, \
     discount_code, status, payment_method, shipping_name, shipping_phone, shipping_address, note, \
     transaction_no, bank_code, card_type, pay_date, response_code, response_message, \
     created_at, updated_at, paid_at";

/// Postgres-backed order repository.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn get_by_id(&self, id: i64) -> RepositoryResult<Order> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| RepositoryError::NotFound(format!("order {}", id)))?
            .into_domain()
    }

    async fn compare_and_set_status(
        &self,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
    ) -> RepositoryResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET status = $1, updated_at = NOW()
             WHERE id = $2 AND status = $3
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(to.as_str())
        .bind(id)
        .bind(from.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(OrderRow::into_domain).transpose()
    }

    async fn mark_paid(
        &self,
        id: i64,
        expected: &[OrderStatus],
        details: &PaymentDetails,
    ) -> RepositoryResult<Option<Order>> {
        let expected: Vec<String> = expected.iter().map(|s| s.as_str().to_string()).collect();

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET
                status = $1,
                transaction_no = $2,
                bank_code = $3,
                card_type = $4,
                pay_date = $5,
                response_code = $6,
                response_message = $7,
                paid_at = NOW(),
                updated_at = NOW()
             WHERE id = $8 AND status = ANY($9)
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(OrderStatus::Paid.as_str())
        .bind(&details.transaction_no)
        .bind(&details.bank_code)
        .bind(&details.card_type)
        .bind(&details.pay_date)
        .bind(&details.response_code)
        .bind(&details.response_message)
        .bind(id)
        .bind(&expected)
        .fetch_optional(&self.pool)
        .await?;

        row.map(OrderRow::into_domain).transpose()
    }

    async fn record_payment_response(
        &self,
        id: i64,
        details: &PaymentDetails,
    ) -> RepositoryResult<Order> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET
                transaction_no = COALESCE($1, transaction_no),
                bank_code = COALESCE($2, bank_code),
                card_type = COALESCE($3, card_type),
                pay_date = COALESCE($4, pay_date),
                response_code = $5,
                response_message = $6,
                updated_at = NOW()
             WHERE id = $7 AND status <> $8
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(&details.transaction_no)
        .bind(&details.bank_code)
        .bind(&details.card_type)
        .bind(&details.pay_date)
        .bind(&details.response_code)
        .bind(&details.response_message)
        .bind(id)
        .bind(OrderStatus::Paid.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_domain(),
            // Either missing or already paid; paid orders are left untouched.
            None => self.get_by_id(id).await,
        }
    }

    async fn append_status_log(&self, entry: &NewStatusLog) -> RepositoryResult<OrderStatusLog> {
        let row = sqlx::query_as::<_, StatusLogRow>(
            r#"
            INSERT INTO order_status_logs (order_id, status, reason, changed_by)
            VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, status, reason, changed_by, created_at
            "#,
        )
        .bind(entry.order_id)
        .bind(entry.status.as_str())
        .bind(&entry.reason)
        .bind(entry.changed_by)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn status_logs(&self, order_id: i64) -> RepositoryResult<Vec<OrderStatusLog>> {
        let rows = sqlx::query_as::<_, StatusLogRow>(
            "SELECT id, order_id, status, reason, changed_by, created_at
             FROM order_status_logs WHERE order_id = $1 ORDER BY id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StatusLogRow::into_domain).collect()
    }
}

fn parse_status(raw: &str) -> RepositoryResult<OrderStatus> {
    raw.parse::<OrderStatus>()
        .map_err(|e| RepositoryError::Other(format!("corrupt order status in storage: {}", e)))
}

/// Row type for SQLx. Shared with the checkout and listing queries.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderRow {
    id: i64,
    user_id: Option<i64>,
    subtotal: BigDecimal,
    discount_amount: BigDecimal,
    shipping_fee: BigDecimal,
    total: BigDecimal,
    discount_code: Option<String>,
    status: String,
    payment_method: String,
    shipping_name: String,
    shipping_phone: String,
    shipping_address: String,
    note: Option<String>,
    transaction_no: Option<String>,
    bank_code: Option<String>,
    card_type: Option<String>,
    pay_date: Option<String>,
    response_code: Option<String>,
    response_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    pub(crate) fn into_domain(self) -> RepositoryResult<Order> {
        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            subtotal: self.subtotal,
            discount_amount: self.discount_amount,
            shipping_fee: self.shipping_fee,
            total: self.total,
            discount_code: self.discount_code,
            status: parse_status(&self.status)?,
            payment_method: self.payment_method,
            shipping_name: self.shipping_name,
            shipping_phone: self.shipping_phone,
            shipping_address: self.shipping_address,
            note: self.note,
            transaction_no: self.transaction_no,
            bank_code: self.bank_code,
            card_type: self.card_type,
            pay_date: self.pay_date,
            response_code: self.response_code,
            response_message: self.response_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
            paid_at: self.paid_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatusLogRow {
    id: i64,
    order_id: i64,
    status: String,
    reason: String,
    changed_by: Option<i64>,
    created_at: DateTime<Utc>,
}

impl StatusLogRow {
    fn into_domain(self) -> RepositoryResult<OrderStatusLog> {
        Ok(OrderStatusLog {
            id: self.id,
            order_id: self.order_id,
            status: parse_status(&self.status)?,
            reason: self.reason,
            changed_by: self.changed_by,
            created_at: self.created_at,
        })
    }
}
