use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::models::{Booking, BookingStatus};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },

    #[error("a reason is required to move a booking to {0}")]
    MissingReason(BookingStatus),

    #[error("amount {supplied} does not match the service price {expected} {currency}")]
    AmountMismatch {
        supplied: i64,
        expected: i64,
        currency: String,
    },

    #[error("amount {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: i64, minimum: i64 },

    #[error("service is free and cannot be paid for")]
    FreeService,

    #[error("booking {0} was modified concurrently, retry the request")]
    StaleWrite(String),

    #[error("payment provider timed out")]
    ProviderTimeout,

    #[error("payment provider error: {0}")]
    ProviderError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("could not allocate a unique booking code")]
    CodeGenerationExhausted,

    #[error("booking {} was superseded by a confirmed booking", .0.code)]
    Superseded(Box<Booking>),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("forbidden")]
    Forbidden,

    #[error("unauthorized")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Errors the caller may resolve by re-issuing the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::StaleWrite(_) | AppError::ProviderTimeout | AppError::ProviderError(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::MissingReason(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AmountMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BelowMinimum { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::FreeService => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::StaleWrite(_) => StatusCode::CONFLICT,
            AppError::ProviderTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::ProviderError(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::CodeGenerationExhausted => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Superseded(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = serde_json::json!({
            "error": self.to_string(),
            "retryable": self.is_retryable(),
        });
        if let AppError::Superseded(booking) = &self {
            body["booking"] = serde_json::to_value(booking.as_ref()).unwrap_or_default();
        }
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::StaleWrite("b1".into()).is_retryable());
        assert!(AppError::ProviderTimeout.is_retryable());
        assert!(AppError::ProviderError("503".into()).is_retryable());
        assert!(!AppError::FreeService.is_retryable());
        assert!(!AppError::MissingReason(BookingStatus::Canceled).is_retryable());
        assert!(!AppError::InvalidTransition {
            from: BookingStatus::Requested,
            to: BookingStatus::Completed,
        }
        .is_retryable());
    }

    #[test]
    fn test_status_codes() {
        let res = AppError::NotFound("booking x".into()).into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let res = AppError::ProviderTimeout.into_response();
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
        let res = AppError::AmountMismatch {
            supplied: 400,
            expected: 500,
            currency: "USD".into(),
        }
        .into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
