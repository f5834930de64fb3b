pub mod matcher_service;
pub mod order_service;

pub use matcher_service::MatcherService;
pub use order_service::OrderService;
