//! Rating API handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use shared::types::{Rating, UserRole};
use shared::{AppError, AppResult};
use validator::Validate;

use crate::auth::CurrentUser;
use crate::core::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRatingRequest {
    pub order_id: u64,
    pub stars: u8,
    #[validate(length(max = 500))]
    pub comment: Option<String>,
}

/// Rate a completed order (the order's customer)
pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateRatingRequest>,
) -> AppResult<Json<Rating>> {
    if user.role != UserRole::Customer {
        return Err(AppError::forbidden("Only customers rate orders"));
    }
    payload
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let rating = state
        .ratings
        .rate(payload.order_id, user.id, payload.stars, payload.comment)?;
    Ok(Json(rating))
}

/// The caller's ratings: received for drivers, written for everyone else
pub async fn mine(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Rating>>> {
    let ratings = if user.is_driver() {
        state.ratings.for_driver(user.id)?
    } else {
        state.ratings.by_customer(user.id)?
    };
    Ok(Json(ratings))
}

/// Ratings received by a driver, visible to any authenticated user
pub async fn for_driver(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(driver_id): Path<i64>,
) -> AppResult<Json<Vec<Rating>>> {
    Ok(Json(state.ratings.for_driver(driver_id)?))
}
