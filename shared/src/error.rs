//! Unified error system
//!
//! Every recoverable failure is reported with a specific [`ErrorCode`];
//! codes are stable machine-readable strings, never collapsed into a
//! generic failure. [`AppError`] carries the code plus a human message
//! and converts directly into an HTTP response.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes exposed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Order/driver/user absent
    NotFound,
    /// Missing or invalid identity
    Unauthorized,
    /// Identity lacks the required role or is not the counterparty
    Forbidden,
    /// State machine guard violated
    InvalidTransition,
    /// Lost the accept race; the order is no longer available
    AlreadyAccepted,
    /// Ledger floor violated
    InsufficientFunds,
    /// Wallet suspended; new debits blocked
    WalletInactive,
    /// One rating per order
    AlreadyRated,
    /// Malformed input
    Validation,
    /// Unexpected internal failure
    Internal,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::InvalidTransition => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::AlreadyAccepted => StatusCode::CONFLICT,
            ErrorCode::InsufficientFunds => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::WalletInactive => StatusCode::FORBIDDEN,
            ErrorCode::AlreadyRated => StatusCode::CONFLICT,
            ErrorCode::Validation => StatusCode::BAD_REQUEST,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::Forbidden => "Permission denied",
            ErrorCode::InvalidTransition => "Invalid status transition",
            ErrorCode::AlreadyAccepted => "Order no longer available",
            ErrorCode::InsufficientFunds => "Insufficient wallet balance",
            ErrorCode::WalletInactive => "Wallet is suspended",
            ErrorCode::AlreadyRated => "Order already rated",
            ErrorCode::Validation => "Validation failed",
            ErrorCode::Internal => "Internal server error",
        }
    }
}

/// Application error with a stable code and a client-facing message
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
}

impl AppError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
        }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::NotFound, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::Forbidden, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::Validation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(error = %message, "Internal error");
        Self::with_message(ErrorCode::Internal, message)
    }
}

/// Unified API response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AppError>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(err: &AppError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        // Internal details stay in the log, not the response body
        let body = if self.code == ErrorCode::Internal {
            ApiResponse::<()>::error(&AppError::new(ErrorCode::Internal))
        } else {
            ApiResponse::<()>::error(&self)
        };
        (status, Json(body)).into_response()
    }
}

/// Handler result type alias
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_expected_statuses() {
        assert_eq!(
            ErrorCode::AlreadyAccepted.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(ErrorCode::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::InsufficientFunds.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn lost_race_presents_as_unavailable() {
        let err = AppError::new(ErrorCode::AlreadyAccepted);
        assert_eq!(err.message, "Order no longer available");
    }
}
