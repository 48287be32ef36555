//! Update order status use case.
//! Validates, authorizes and applies one status transition, then leaves an
//! audit row behind.

use std::sync::Arc;

use crate::domain::{parse_order_id, NewStatusLog, Order, OrderStatus};
use crate::error::AppError;
use crate::ports::{OrderEvents, OrderRepository};

/// Who is asking for the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Customer(i64),
    Admin(i64),
    /// Operator tooling with no user account behind it.
    System,
}

impl Actor {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Actor::Customer(id) | Actor::Admin(id) => Some(*id),
            Actor::System => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Actor::Customer(id) => format!("customer #{}", id),
            Actor::Admin(id) => format!("admin #{}", id),
            Actor::System => "system".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateStatusInput {
    /// Raw id as it came off the path.
    pub order_id: String,
    pub status: String,
    pub reason: Option<String>,
    pub actor: Actor,
}

pub struct UpdateOrderStatus {
    orders: Arc<dyn OrderRepository>,
    events: Arc<dyn OrderEvents>,
}

impl UpdateOrderStatus {
    pub fn new(orders: Arc<dyn OrderRepository>, events: Arc<dyn OrderEvents>) -> Self {
        Self { orders, events }
    }

    pub async fn execute(&self, input: UpdateStatusInput) -> Result<Order, AppError> {
        let order_id = parse_order_id(&input.order_id)?;
        let target: OrderStatus = input.status.parse()?;

        let order = self.orders.get_by_id(order_id).await?;

        if let Actor::Customer(user_id) = input.actor {
            if !order.is_owned_by(user_id) {
                tracing::warn!(order_id, user_id, "status change refused: not the order owner");
                return Err(AppError::Forbidden(
                    "You do not have permission to change this order".to_string(),
                ));
            }
        }

        let previous = order.status;
        if let Actor::Customer(user_id) = input.actor {
            if !previous.customer_may_request(target) {
                tracing::warn!(order_id, user_id, from = %previous, to = %target, "status change refused: not a customer action");
                return Err(AppError::Forbidden(format!(
                    "Customers cannot move an order from {} to {}",
                    previous, target
                )));
            }
        }

        if !previous.can_transition_to(target) {
            return Err(AppError::Conflict(format!(
                "Order #{} cannot move from {} to {}",
                order_id, previous, target
            )));
        }

        let updated = self
            .orders
            .compare_and_set_status(order_id, previous, target)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "Order #{} was modified concurrently; reload and try again",
                    order_id
                ))
            })?;

        let reason = input
            .reason
            .map(|reason| crate::validation::sanitize_string(&reason))
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| {
                format!(
                    "Status changed from {} to {} by {}",
                    previous,
                    target,
                    input.actor.describe()
                )
            });

        let entry = NewStatusLog {
            order_id,
            status: target,
            reason,
            changed_by: input.actor.user_id(),
        };
        if let Err(e) = self.orders.append_status_log(&entry).await {
            tracing::error!(order_id, status = %target, error = %e, "failed to append order status log");
        }

        tracing::info!(
            order_id,
            from = %previous,
            to = %target,
            actor = %input.actor.describe(),
            "order status updated"
        );

        self.events
            .status_changed(&updated, previous, input.actor.user_id())
            .await;

        Ok(updated)
    }
}
