//! Admin API handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use shared::types::{LedgerReason, PlatformSettings, User, UserRole};
use shared::util::now_millis;
use shared::{AppError, AppResult};
use validator::Validate;

use crate::audit::{DashboardStats, DriverStats, OrderLog, OrderLogQuery};
use crate::auth::CurrentUser;
use crate::core::AppState;
use crate::live::LastLocation;
use crate::store::StoreError;

fn require_admin(user: &CurrentUser) -> AppResult<()> {
    if !user.is_admin() {
        return Err(AppError::forbidden("Admins only"));
    }
    Ok(())
}

// ========== Users ==========

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub role: Option<UserRole>,
}

pub async fn list_users(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<UsersQuery>,
) -> AppResult<Json<Vec<User>>> {
    require_admin(&user)?;
    let mut users = state.store.list_users()?;
    if let Some(role) = query.role {
        users.retain(|u| u.role == role);
    }
    Ok(Json(users))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpsertUserRequest {
    pub id: i64,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: Option<String>,
    pub role: UserRole,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Mirror an externally minted identity into the user table
pub async fn upsert_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<UpsertUserRequest>,
) -> AppResult<Json<User>> {
    require_admin(&user)?;
    payload
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let txn = state.store.begin_write()?;
    let created_at = state
        .store
        .get_user(payload.id)?
        .map(|u| u.created_at)
        .unwrap_or_else(now_millis);
    let record = User {
        id: payload.id,
        name: payload.name,
        phone: payload.phone,
        role: payload.role,
        is_active: payload.is_active,
        created_at,
    };
    state.store.put_user(&txn, &record)?;
    txn.commit().map_err(StoreError::from)?;

    tracing::info!(user_id = record.id, role = %record.role, "User upserted");
    Ok(Json(record))
}

#[derive(Debug, serde::Serialize, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

/// Activate or suspend a platform account
pub async fn set_user_active(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<SetActiveRequest>,
) -> AppResult<Json<User>> {
    require_admin(&user)?;

    let mut record = state
        .store
        .get_user(id)?
        .ok_or_else(|| AppError::not_found(format!("User {id} not found")))?;
    record.is_active = payload.is_active;

    let txn = state.store.begin_write()?;
    state.store.put_user(&txn, &record)?;
    txn.commit().map_err(StoreError::from)?;

    tracing::info!(user_id = id, is_active = payload.is_active, "User activation changed");
    Ok(Json(record))
}

// ========== Wallets ==========

/// Suspend or reinstate a driver's wallet
pub async fn set_wallet_active(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(driver_id): Path<i64>,
    Json(payload): Json<SetActiveRequest>,
) -> AppResult<Json<SetActiveRequest>> {
    require_admin(&user)?;
    state.ledger.set_wallet_active(driver_id, payload.is_active)?;
    tracing::info!(driver_id, is_active = payload.is_active, "Wallet activation changed");
    Ok(Json(payload))
}

#[derive(Debug, Deserialize, Validate)]
pub struct TopUpRequest {
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(length(max = 255))]
    pub description: Option<String>,
}

#[derive(serde::Serialize)]
pub struct BalanceAfterResponse {
    pub driver_id: i64,
    pub balance: i64,
}

/// Credit a driver's wallet after an out-of-band payment
pub async fn top_up(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(driver_id): Path<i64>,
    Json(payload): Json<TopUpRequest>,
) -> AppResult<Json<BalanceAfterResponse>> {
    require_admin(&user)?;
    payload
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let balance = state.ledger.credit(
        driver_id,
        payload.amount,
        LedgerReason::Topup,
        None,
        payload.description,
    )?;
    Ok(Json(BalanceAfterResponse { driver_id, balance }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdjustRequest {
    /// Positive credits the wallet; corrections only
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(length(min = 1, max = 255))]
    pub description: String,
}

/// Manual correction credit, always with a reason on record
pub async fn adjust(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(driver_id): Path<i64>,
    Json(payload): Json<AdjustRequest>,
) -> AppResult<Json<BalanceAfterResponse>> {
    require_admin(&user)?;
    payload
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let balance = state.ledger.credit(
        driver_id,
        payload.amount,
        LedgerReason::Adjustment,
        None,
        Some(payload.description),
    )?;
    Ok(Json(BalanceAfterResponse { driver_id, balance }))
}

// ========== Reporting ==========

pub async fn driver_stats(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<DriverStats>> {
    require_admin(&user)?;
    Ok(Json(state.audit.driver_stats(id)?))
}

/// Last known position of every driver that has reported one
pub async fn driver_locations(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<LastLocation>>> {
    require_admin(&user)?;
    Ok(Json(state.hub.last_known_locations()))
}

pub async fn order_logs(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<OrderLogQuery>,
) -> AppResult<Json<Vec<OrderLog>>> {
    require_admin(&user)?;
    Ok(Json(state.audit.order_logs(query)?))
}

pub async fn dashboard(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<DashboardStats>> {
    require_admin(&user)?;
    let connected = state.hub.connected_drivers().len();
    Ok(Json(state.audit.dashboard_stats(connected)?))
}

// ========== Settings ==========

pub async fn get_settings(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<PlatformSettings>> {
    require_admin(&user)?;
    let defaults = PlatformSettings {
        commission_amount: state.config.default_commission_amount,
        min_wallet_floor: state.config.default_min_wallet_floor,
        updated_at: 0,
    };
    Ok(Json(state.store.get_settings(&defaults)?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    #[validate(range(min = 0))]
    pub commission_amount: i64,
    pub min_wallet_floor: i64,
}

/// Replace platform settings. Applies to orders created from now on;
/// existing orders keep their commission snapshot.
pub async fn update_settings(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<UpdateSettingsRequest>,
) -> AppResult<Json<PlatformSettings>> {
    require_admin(&user)?;
    payload
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let settings = PlatformSettings {
        commission_amount: payload.commission_amount,
        min_wallet_floor: payload.min_wallet_floor,
        updated_at: now_millis(),
    };
    let txn = state.store.begin_write()?;
    state.store.put_settings(&txn, &settings)?;
    txn.commit().map_err(StoreError::from)?;

    tracing::info!(
        commission = settings.commission_amount,
        floor = settings.min_wallet_floor,
        "Platform settings updated"
    );
    Ok(Json(settings))
}
