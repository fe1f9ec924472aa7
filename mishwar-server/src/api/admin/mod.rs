//! Admin API module
//!
//! Every route requires the admin role; the check lives in the handlers
//! so each one can report a specific error.

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::AppState;

pub fn router() -> Router<AppState> {
    Router::new().nest("/api/admin", routes())
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(handler::list_users).post(handler::upsert_user))
        .route("/users/{id}/active", post(handler::set_user_active))
        .route(
            "/wallets/{driver_id}/active",
            post(handler::set_wallet_active),
        )
        .route("/wallets/{driver_id}/topup", post(handler::top_up))
        .route("/wallets/{driver_id}/adjust", post(handler::adjust))
        .route("/drivers/{id}/stats", get(handler::driver_stats))
        .route("/drivers/locations", get(handler::driver_locations))
        .route("/orders/logs", get(handler::order_logs))
        .route(
            "/settings",
            get(handler::get_settings).put(handler::update_settings),
        )
        .route("/dashboard", get(handler::dashboard))
}
