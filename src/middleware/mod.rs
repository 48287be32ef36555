pub mod auth;
pub mod ip_filter;
pub mod rate_limit;
pub mod request_logger;
