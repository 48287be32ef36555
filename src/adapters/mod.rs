pub mod in_memory;
pub mod postgres_order_events;
pub mod postgres_order_repository;

pub use in_memory::{InMemoryOrderRepository, RecordedEvent, RecordingOrderEvents};
pub use postgres_order_events::PostgresOrderEvents;
pub use postgres_order_repository::PostgresOrderRepository;
