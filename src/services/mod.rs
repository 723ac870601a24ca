pub mod chat_service;
pub mod gateway;
pub mod health_service;
pub mod notification_service;
pub mod push;
pub mod rate_limit_service;
pub mod store;
