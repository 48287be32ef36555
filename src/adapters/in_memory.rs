//! In-process implementations of the order ports, used by tests and the
//! router-level integration suite.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::domain::{NewStatusLog, Order, OrderStatus, OrderStatusLog, PaymentDetails};
use crate::ports::{OrderEvents, OrderRepository, RepositoryError, RepositoryResult};

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<HashMap<i64, Order>>,
    logs: Mutex<Vec<OrderStatusLog>>,
    fail_log_appends: AtomicBool,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, order: Order) {
        self.lock_orders().insert(order.id, order);
    }

    /// Current snapshot of an order, if present.
    pub fn snapshot(&self, id: i64) -> Option<Order> {
        self.lock_orders().get(&id).cloned()
    }

    pub fn all_logs(&self) -> Vec<OrderStatusLog> {
        self.lock_logs().clone()
    }

    /// Makes every subsequent `append_status_log` fail.
    pub fn fail_log_appends(&self, fail: bool) {
        self.fail_log_appends.store(fail, Ordering::SeqCst);
    }

    fn lock_orders(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Order>> {
        self.orders.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_logs(&self) -> std::sync::MutexGuard<'_, Vec<OrderStatusLog>> {
        self.logs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn get_by_id(&self, id: i64) -> RepositoryResult<Order> {
        self.snapshot(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", id)))
    }

    async fn compare_and_set_status(
        &self,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
    ) -> RepositoryResult<Option<Order>> {
        let mut orders = self.lock_orders();
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", id)))?;

        if order.status != from {
            return Ok(None);
        }
        order.status = to;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn mark_paid(
        &self,
        id: i64,
        expected: &[OrderStatus],
        details: &PaymentDetails,
    ) -> RepositoryResult<Option<Order>> {
        let mut orders = self.lock_orders();
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", id)))?;

        if !expected.contains(&order.status) {
            return Ok(None);
        }
        let now = Utc::now();
        order.status = OrderStatus::Paid;
        order.transaction_no = details.transaction_no.clone();
        order.bank_code = details.bank_code.clone();
        order.card_type = details.card_type.clone();
        order.pay_date = details.pay_date.clone();
        order.response_code = Some(details.response_code.clone());
        order.response_message = Some(details.response_message.clone());
        order.paid_at = Some(now);
        order.updated_at = now;
        Ok(Some(order.clone()))
    }

    async fn record_payment_response(
        &self,
        id: i64,
        details: &PaymentDetails,
    ) -> RepositoryResult<Order> {
        let mut orders = self.lock_orders();
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", id)))?;

        if order.status != OrderStatus::Paid {
            if details.transaction_no.is_some() {
                order.transaction_no = details.transaction_no.clone();
            }
            if details.bank_code.is_some() {
                order.bank_code = details.bank_code.clone();
            }
            if details.card_type.is_some() {
                order.card_type = details.card_type.clone();
            }
            if details.pay_date.is_some() {
                order.pay_date = details.pay_date.clone();
            }
            order.response_code = Some(details.response_code.clone());
            order.response_message = Some(details.response_message.clone());
            order.updated_at = Utc::now();
        }
        Ok(order.clone())
    }

    async fn append_status_log(&self, entry: &NewStatusLog) -> RepositoryResult<OrderStatusLog> {
        if self.fail_log_appends.load(Ordering::SeqCst) {
            return Err(RepositoryError::Other("status log store unavailable".to_string()));
        }

        let mut logs = self.lock_logs();
        let log = OrderStatusLog {
            id: logs.len() as i64 + 1,
            order_id: entry.order_id,
            status: entry.status,
            reason: entry.reason.clone(),
            changed_by: entry.changed_by,
            created_at: Utc::now(),
        };
        logs.push(log.clone());
        Ok(log)
    }

    async fn status_logs(&self, order_id: i64) -> RepositoryResult<Vec<OrderStatusLog>> {
        Ok(self
            .lock_logs()
            .iter()
            .filter(|log| log.order_id == order_id)
            .cloned()
            .collect())
    }
}

/// One recorded `OrderEvents::status_changed` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub order_id: i64,
    pub previous: OrderStatus,
    pub current: OrderStatus,
    pub actor: Option<i64>,
}

#[derive(Default)]
pub struct RecordingOrderEvents {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingOrderEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl OrderEvents for RecordingOrderEvents {
    async fn status_changed(&self, order: &Order, previous: OrderStatus, actor: Option<i64>) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedEvent {
                order_id: order.id,
                previous,
                current: order.status,
                actor,
            });
    }
}
