use axum::{
    extract::Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Service error. NotFound, Validation and BusinessLogic messages reach the
/// caller verbatim; anything else is logged and reported generically.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    BusinessLogic(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Statement import error: {0}")]
    Import(#[from] csv::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn business(msg: impl Into<String>) -> Self {
        Self::BusinessLogic(msg.into())
    }

    /// Infrastructure failures, as opposed to the caller-facing taxonomy.
    pub fn is_unexpected(&self) -> bool {
        !matches!(
            self,
            Self::NotFound(_) | Self::Validation(_) | Self::BusinessLogic(_)
        )
    }

    /// Log unexpected failures once, at the public operation boundary.
    pub fn logged(self, operation: &str) -> Self {
        if self.is_unexpected() {
            tracing::error!(operation, error = ?self, "operation failed");
        } else {
            tracing::debug!(operation, error = %self, "operation rejected");
        }
        self
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::BusinessLogic(msg) => (StatusCode::CONFLICT, msg.clone()),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = ErrorResponse {
            success: false,
            message,
        };
        (status, Json(body)).into_response()
    }
}
