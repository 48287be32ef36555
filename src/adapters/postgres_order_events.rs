//! Postgres-backed side effects of an order status change.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{Order, OrderStatus};
use crate::ports::OrderEvents;
use crate::services::{inventory, loyalty, notifications};

/// Runs notification, loyalty and restock work for a status change.
///
/// `new` spawns the work and returns immediately. `inline` awaits it, for
/// one-shot commands that exit right after the change.
#[derive(Clone)]
pub struct PostgresOrderEvents {
    pool: PgPool,
    detached: bool,
}

impl PostgresOrderEvents {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, detached: true }
    }

    pub fn inline(pool: PgPool) -> Self {
        Self { pool, detached: false }
    }
}

#[async_trait]
impl OrderEvents for PostgresOrderEvents {
    async fn status_changed(&self, order: &Order, previous: OrderStatus, actor: Option<i64>) {
        let pool = self.pool.clone();
        let order = order.clone();
        if self.detached {
            tokio::spawn(apply_side_effects(pool, order, previous, actor));
        } else {
            apply_side_effects(pool, order, previous, actor).await;
        }
    }
}

async fn apply_side_effects(pool: PgPool, order: Order, previous: OrderStatus, actor: Option<i64>) {
    tracing::debug!(
        order_id = order.id,
        from = %previous,
        to = %order.status,
        actor = ?actor,
        "running order status side effects"
    );

    if let Some(user_id) = order.user_id {
        let (title, body) = notifications::order_status_message(order.id, order.status);
        let kind = if order.status == OrderStatus::Paid {
            notifications::KIND_PAYMENT
        } else {
            notifications::KIND_ORDER
        };
        notifications::notify_best_effort(&pool, user_id, kind, &title, &body).await;

        if order.status == OrderStatus::Completed {
            award_loyalty(&pool, &order, user_id).await;
        }
    }

    if order.status == OrderStatus::Cancelled {
        match inventory::restock_order(&pool, order.id).await {
            Ok(rows) => tracing::info!(order_id = order.id, rows, "cancelled order restocked"),
            Err(e) => tracing::warn!(order_id = order.id, error = %e, "failed to restock cancelled order"),
        }
    }
}

async fn award_loyalty(pool: &PgPool, order: &Order, user_id: i64) {
    let points = loyalty::points_for_total(&order.total);
    if points <= 0 {
        return;
    }

    match loyalty::award_points(pool, user_id, points).await {
        Ok(balance) => {
            tracing::info!(order_id = order.id, user_id, points, balance, "loyalty points awarded");
            let message = format!(
                "You earned {} points from order #{}. Balance: {}.",
                points, order.id, balance
            );
            notifications::notify_best_effort(
                pool,
                user_id,
                notifications::KIND_LOYALTY,
                "Loyalty points earned",
                &message,
            )
            .await;
        }
        Err(e) => {
            tracing::warn!(order_id = order.id, user_id, error = %e, "failed to award loyalty points");
        }
    }
}
