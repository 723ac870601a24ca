pub mod chat;
pub mod health;
pub mod internal;
pub mod notifications;

use crate::domain::Pagination;
use crate::error::AppError;
use serde::Serialize;

/// Body of every successful response: `{"success": true, "data": ...}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl<T> ApiResponse<T> {
    pub const fn ok(data: T) -> Self {
        Self { success: true, data, pagination: None, message: None }
    }

    pub const fn paginated(data: T, pagination: Pagination) -> Self {
        Self { success: true, data, pagination: Some(pagination), message: None }
    }

    #[must_use]
    pub const fn with_message(mut self, message: &'static str) -> Self {
        self.message = Some(message);
        self
    }
}

/// Turns an extractor rejection into the JSON error envelope.
pub fn invalid_input(rejection: impl std::fmt::Display) -> AppError {
    AppError::bad_request(rejection.to_string())
}
