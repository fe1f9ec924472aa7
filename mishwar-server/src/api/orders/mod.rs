//! Order API module
//!
//! All mutations go through the order manager; handlers only authorize,
//! translate and publish the post-commit notifications.

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::AppState;

pub fn router() -> Router<AppState> {
    Router::new().nest("/api/orders", routes())
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handler::create))
        .route("/pending", get(handler::pending))
        .route("/mine", get(handler::mine))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/accept", post(handler::accept))
        .route("/{id}/status", post(handler::update_status))
        .route("/{id}/cancel", post(handler::cancel))
        .route("/{id}/history", get(handler::history))
}
