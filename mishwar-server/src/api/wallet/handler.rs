//! Wallet API handlers (driver self-service, read-only)
//!
//! Top-ups and suspensions are admin operations, see the admin module.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use shared::types::LedgerEntry;
use shared::{AppError, AppResult};

use crate::auth::CurrentUser;
use crate::core::AppState;

#[derive(Serialize)]
pub struct BalanceResponse {
    pub driver_id: i64,
    pub balance: i64,
    pub is_active: bool,
    pub can_accept_orders: bool,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

fn require_driver(user: &CurrentUser) -> AppResult<()> {
    if !user.is_driver() {
        return Err(AppError::forbidden("Drivers only"));
    }
    Ok(())
}

/// Current balance and acceptance eligibility
pub async fn balance(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<BalanceResponse>> {
    require_driver(&user)?;
    let wallet = state.store.get_wallet(user.id)?;
    Ok(Json(BalanceResponse {
        driver_id: user.id,
        balance: wallet.as_ref().map(|w| w.balance).unwrap_or(0),
        is_active: wallet.as_ref().map(|w| w.is_active).unwrap_or(true),
        can_accept_orders: state.ledger.can_accept_orders(user.id)?,
    }))
}

/// Ledger entries for the caller, newest first
pub async fn transactions(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<TransactionsQuery>,
) -> AppResult<Json<Vec<LedgerEntry>>> {
    require_driver(&user)?;
    Ok(Json(state.ledger.history(user.id, query.limit.min(500))?))
}

#[derive(Serialize)]
pub struct CanAcceptResponse {
    pub can_accept_orders: bool,
}

/// Advisory eligibility check; the accept transaction remains authoritative
pub async fn can_accept(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<CanAcceptResponse>> {
    require_driver(&user)?;
    Ok(Json(CanAcceptResponse {
        can_accept_orders: state.ledger.can_accept_orders(user.id)?,
    }))
}
