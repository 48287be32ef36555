pub mod auth;
pub mod cache;
pub mod discounts;
pub mod inventory;
pub mod loyalty;
pub mod mailer;
pub mod notifications;
pub mod rate_limiter;

pub use cache::TtlCache;
pub use mailer::{EmailMessage, Mailer};
pub use rate_limiter::{RateLimitDecision, RateLimiter};
