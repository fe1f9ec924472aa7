//! Domain error to API error conversions
//!
//! Internal storage failures are logged at the conversion point and
//! presented as opaque internal errors; everything else keeps its
//! specific code.

use shared::{AppError, ErrorCode};

use crate::ledger::LedgerError;
use crate::orders::OrderError;
use crate::ratings::RatingError;
use crate::store::StoreError;

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::internal(e.to_string())
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NotFound(id) => AppError::not_found(format!("Order {id} not found")),
            OrderError::AlreadyAccepted(_) => AppError::new(ErrorCode::AlreadyAccepted),
            OrderError::InvalidTransition { from, to } => AppError::with_message(
                ErrorCode::InvalidTransition,
                format!("Cannot move order from {from} to {to}"),
            ),
            OrderError::NotAuthorized(msg) => AppError::forbidden(msg),
            OrderError::InsufficientFunds { balance, required } => AppError::with_message(
                ErrorCode::InsufficientFunds,
                format!("Balance {balance} is below the required {required}"),
            ),
            OrderError::WalletInactive(_) => AppError::new(ErrorCode::WalletInactive),
            OrderError::AccountSuspended(_) => AppError::forbidden("Account is suspended"),
            OrderError::Validation(msg) => AppError::validation(msg),
            OrderError::Store(e) => AppError::internal(e.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds { balance, required } => AppError::with_message(
                ErrorCode::InsufficientFunds,
                format!("Balance {balance} is below the required {required}"),
            ),
            LedgerError::WalletInactive(_) => AppError::new(ErrorCode::WalletInactive),
            LedgerError::InvalidAmount(v) => AppError::validation(format!("Invalid amount: {v}")),
            LedgerError::Store(e) => AppError::internal(e.to_string()),
        }
    }
}

impl From<RatingError> for AppError {
    fn from(e: RatingError) -> Self {
        match e {
            RatingError::OrderNotFound(id) => AppError::not_found(format!("Order {id} not found")),
            RatingError::NotCompleted => {
                AppError::validation("Only completed orders can be rated")
            }
            RatingError::NotYourOrder => {
                AppError::forbidden("Only the order's customer may rate it")
            }
            RatingError::AlreadyRated => AppError::new(ErrorCode::AlreadyRated),
            RatingError::InvalidStars(v) => {
                AppError::validation(format!("Stars must be between 1 and 5, got {v}"))
            }
            RatingError::Store(e) => AppError::internal(e.to_string()),
        }
    }
}
