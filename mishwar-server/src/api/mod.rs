//! API routes
//!
//! # Structure
//!
//! - [`health`] - liveness probe
//! - [`orders`] - order lifecycle endpoints
//! - [`wallet`] - driver wallet queries
//! - [`ratings`] - order ratings
//! - [`admin`] - platform administration
//! - [`ws`] - live event stream

pub mod convert;

pub mod admin;
pub mod health;
pub mod orders;
pub mod ratings;
pub mod wallet;
pub mod ws;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::AppState;

/// Assemble the full application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(orders::router())
        .merge(wallet::router())
        .merge(ratings::router())
        .merge(admin::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
