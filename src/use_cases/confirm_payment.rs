//! Confirm payment use case.
//! Applies a verified gateway callback to its order exactly once.

use std::sync::Arc;

use crate::domain::{NewStatusLog, Order, OrderStatus};
use crate::payment::vnpay::{GatewayCallback, IpnCode};
use crate::ports::{OrderEvents, OrderRepository, RepositoryError};

/// Statuses from which a successful payment may move an order to PAID.
const PAYABLE: [OrderStatus; 2] = [OrderStatus::AwaitingPayment, OrderStatus::Pending];

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    /// Order moved to PAID by this callback.
    Paid(Order),
    /// Gateway reported a failure; details recorded, status unchanged.
    Failed(Order),
    /// A previous delivery already marked the order PAID. Nothing written.
    AlreadyPaid(Order),
    AmountMismatch { order: Order, reported: String },
    /// Order is in a status that cannot accept payment (e.g. CANCELLED).
    NotPayable(Order),
    OrderNotFound(i64),
}

impl PaymentOutcome {
    pub fn ipn_code(&self) -> IpnCode {
        match self {
            PaymentOutcome::Paid(_) | PaymentOutcome::Failed(_) => IpnCode::ConfirmSuccess,
            PaymentOutcome::AlreadyPaid(_) | PaymentOutcome::NotPayable(_) => IpnCode::AlreadyConfirmed,
            PaymentOutcome::AmountMismatch { .. } => IpnCode::InvalidAmount,
            PaymentOutcome::OrderNotFound(_) => IpnCode::OrderNotFound,
        }
    }
}

pub struct ConfirmPayment {
    orders: Arc<dyn OrderRepository>,
    events: Arc<dyn OrderEvents>,
}

impl ConfirmPayment {
    pub fn new(orders: Arc<dyn OrderRepository>, events: Arc<dyn OrderEvents>) -> Self {
        Self { orders, events }
    }

    /// `callback` must come from parameters whose signature was verified.
    pub async fn execute(&self, callback: &GatewayCallback) -> Result<PaymentOutcome, RepositoryError> {
        let order_id = callback.order_id;
        let order = match self.orders.get_by_id(order_id).await {
            Ok(order) => order,
            Err(RepositoryError::NotFound(_)) => {
                tracing::warn!(order_id, "payment callback for unknown order");
                return Ok(PaymentOutcome::OrderNotFound(order_id));
            }
            Err(e) => return Err(e),
        };

        if order.status == OrderStatus::Paid {
            tracing::info!(order_id, "duplicate payment callback ignored; order already paid");
            return Ok(PaymentOutcome::AlreadyPaid(order));
        }

        let reported = callback.amount_vnd();
        if reported != order.total {
            tracing::warn!(
                order_id,
                expected = %order.total,
                reported = %reported,
                "payment amount mismatch; order left unchanged"
            );
            return Ok(PaymentOutcome::AmountMismatch {
                order,
                reported: reported.to_string(),
            });
        }

        if !PAYABLE.contains(&order.status) {
            tracing::warn!(order_id, status = %order.status, "payment callback for order that is not payable");
            return Ok(PaymentOutcome::NotPayable(order));
        }

        let details = callback.payment_details();

        if !callback.is_success() {
            let order = self.orders.record_payment_response(order_id, &details).await?;
            tracing::info!(
                order_id,
                response_code = %details.response_code,
                "gateway reported unsuccessful payment"
            );
            return Ok(PaymentOutcome::Failed(order));
        }

        let previous = order.status;
        let Some(paid) = self.orders.mark_paid(order_id, &PAYABLE, &details).await? else {
            // A concurrent delivery got there first.
            let current = self.orders.get_by_id(order_id).await?;
            return Ok(if current.status == OrderStatus::Paid {
                PaymentOutcome::AlreadyPaid(current)
            } else {
                PaymentOutcome::NotPayable(current)
            });
        };

        let entry = NewStatusLog {
            order_id,
            status: OrderStatus::Paid,
            reason: format!(
                "Payment confirmed by VNPay (transaction {})",
                details.transaction_no.as_deref().unwrap_or("unknown")
            ),
            changed_by: None,
        };
        if let Err(e) = self.orders.append_status_log(&entry).await {
            tracing::error!(order_id, error = %e, "failed to append payment status log");
        }

        tracing::info!(order_id, transaction_no = ?details.transaction_no, "order marked as paid");
        self.events.status_changed(&paid, previous, None).await;

        Ok(PaymentOutcome::Paid(paid))
    }
}
