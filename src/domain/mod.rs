pub mod order;

pub use order::{
    parse_order_id, NewStatusLog, Order, OrderStatus, OrderStatusLog, PaymentDetails, PaymentMethod,
};
