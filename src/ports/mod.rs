//! Seams between the order use cases and their storage / side effects.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{NewStatusLog, Order, OrderStatus, OrderStatusLog, PaymentDetails};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> RepositoryResult<Order>;

    /// Sets `to` only while the stored status still equals `from`.
    /// Returns `None` when the row had already moved on.
    async fn compare_and_set_status(
        &self,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
    ) -> RepositoryResult<Option<Order>>;

    /// Moves the order to PAID and stores the gateway fields, only while its
    /// status is one of `expected`. Returns `None` otherwise.
    async fn mark_paid(
        &self,
        id: i64,
        expected: &[OrderStatus],
        details: &PaymentDetails,
    ) -> RepositoryResult<Option<Order>>;

    /// Stores a non-successful gateway response without touching the status.
    async fn record_payment_response(
        &self,
        id: i64,
        details: &PaymentDetails,
    ) -> RepositoryResult<Order>;

    async fn append_status_log(&self, entry: &NewStatusLog) -> RepositoryResult<OrderStatusLog>;

    async fn status_logs(&self, order_id: i64) -> RepositoryResult<Vec<OrderStatusLog>>;
}

/// Side effects of a status change. Implementations must not fail the caller.
#[async_trait]
pub trait OrderEvents: Send + Sync {
    async fn status_changed(&self, order: &Order, previous: OrderStatus, actor: Option<i64>);
}
