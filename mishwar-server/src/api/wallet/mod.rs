//! Wallet API module

mod handler;

use axum::{Router, routing::get};

use crate::core::AppState;

pub fn router() -> Router<AppState> {
    Router::new().nest("/api/wallet", routes())
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::balance))
        .route("/transactions", get(handler::transactions))
        .route("/can-accept", get(handler::can_accept))
}
