pub mod confirm_payment;
pub mod update_order_status;

pub use confirm_payment::{ConfirmPayment, PaymentOutcome};
pub use update_order_status::{Actor, UpdateOrderStatus, UpdateStatusInput};
