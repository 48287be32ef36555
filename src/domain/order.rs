//! Order domain entity and its status machine.
//! Framework-agnostic: no SQL or HTTP types in here.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::validation::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    AwaitingPayment,
    Paid,
    Shipping,
    Delivered,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::AwaitingPayment,
        OrderStatus::Paid,
        OrderStatus::Shipping,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::AwaitingPayment => "AWAITING_PAYMENT",
            OrderStatus::Paid => "PAID",
            OrderStatus::Shipping => "SHIPPING",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Statuses reachable in one step from `self`.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[AwaitingPayment, Shipping, Cancelled],
            AwaitingPayment => &[Pending, Paid, Cancelled],
            Paid => &[Shipping, Cancelled],
            Shipping => &[Delivered],
            Delivered => &[Completed],
            Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Changes an order's owner may make themselves: cancelling before
    /// payment clears, and confirming receipt. PAID is only ever written by
    /// a verified gateway callback.
    pub fn customer_may_request(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending | AwaitingPayment, Cancelled) | (Delivered, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Statuses whose orders count towards revenue.
    pub fn is_revenue(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Shipping | OrderStatus::Delivered | OrderStatus::Completed
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| {
                let valid: Vec<&str> = OrderStatus::ALL.iter().map(OrderStatus::as_str).collect();
                ValidationError::new(
                    "status",
                    format!("'{}' is not a valid status; expected one of: {}", value, valid.join(", ")),
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cod,
    Vnpay,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "COD",
            PaymentMethod::Vnpay => "VNPAY",
        }
    }

    /// Status a freshly placed order starts in.
    pub fn initial_status(&self) -> OrderStatus {
        match self {
            PaymentMethod::Cod => OrderStatus::Pending,
            PaymentMethod::Vnpay => OrderStatus::AwaitingPayment,
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "COD" => Ok(PaymentMethod::Cod),
            "VNPAY" => Ok(PaymentMethod::Vnpay),
            _ => Err(ValidationError::new(
                "payment_method",
                "must be one of: COD, VNPAY",
            )),
        }
    }
}

/// Domain entity representing a placed order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: i64,
    pub user_id: Option<i64>,
    pub subtotal: BigDecimal,
    pub discount_amount: BigDecimal,
    pub shipping_fee: BigDecimal,
    pub total: BigDecimal,
    pub discount_code: Option<String>,
    pub status: OrderStatus,
    pub payment_method: String,
    pub shipping_name: String,
    pub shipping_phone: String,
    pub shipping_address: String,
    pub note: Option<String>,
    pub transaction_no: Option<String>,
    pub bank_code: Option<String>,
    pub card_type: Option<String>,
    pub pay_date: Option<String>,
    pub response_code: Option<String>,
    pub response_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.user_id == Some(user_id)
    }
}

/// Gateway-reported fields written onto an order by a payment callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentDetails {
    pub transaction_no: Option<String>,
    pub bank_code: Option<String>,
    pub card_type: Option<String>,
    pub pay_date: Option<String>,
    pub response_code: String,
    pub response_message: String,
}

/// Audit row appended on every status change. Never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderStatusLog {
    pub id: i64,
    pub order_id: i64,
    pub status: OrderStatus,
    pub reason: String,
    pub changed_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStatusLog {
    pub order_id: i64,
    pub status: OrderStatus,
    pub reason: String,
    pub changed_by: Option<i64>,
}

/// Parses an order id taken from a URL path segment or gateway reference.
pub fn parse_order_id(raw: &str) -> Result<i64, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("order_id", "is missing"));
    }

    match trimmed.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        Ok(_) => Err(ValidationError::new(
            "order_id",
            format!("'{}' must be a positive integer", trimmed),
        )),
        Err(_) => Err(ValidationError::new(
            "order_id",
            format!("'{}' is not a valid order id", trimmed),
        )),
    }
}
