//! WebSocket handler for the live event stream
//!
//! One connection per device. Browsers cannot set headers on the upgrade
//! request, so the token travels as a query parameter. Outbound messages
//! drain from the connection's bounded queue in a writer task; the read
//! loop consumes driver location pings.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::AppError;

use crate::auth::CurrentUser;
use crate::core::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub token: String,
}

/// Inbound client messages
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum ClientMessage {
    Location { latitude: f64, longitude: f64 },
    Ping,
}

/// GET /ws?token=... upgrades to the live stream
pub async fn stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let claims = state
        .jwt
        .validate_token(&query.token)
        .map_err(|_| AppError::unauthorized())?;
    let user = CurrentUser::try_from(claims).map_err(|_| AppError::unauthorized())?;

    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, user)))
}

async fn handle_connection(socket: WebSocket, state: AppState, user: CurrentUser) {
    let conn = state.hub.connect(user.id, user.role);
    tracing::info!(user_id = user.id, role = %user.role, conn_id = %conn.id, "Stream connected");

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Writer: drain the bounded queue until the connection closes
    let writer_conn = conn.clone();
    let writer = tokio::spawn(async move {
        while let Some(batch) = writer_conn.next_batch().await {
            for message in batch {
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode stream message");
                        continue;
                    }
                };
                if ws_sink.send(Message::Text(json.into())).await.is_err() {
                    writer_conn.close();
                    return;
                }
            }
        }
        let _ = ws_sink.send(Message::Close(None)).await;
    });

    // Reader: driver location pings and keepalives
    while let Some(Ok(message)) = ws_stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Location {
                    latitude,
                    longitude,
                }) => {
                    conn.touch();
                    if !user.is_driver() {
                        continue;
                    }
                    if !(-90.0..=90.0).contains(&latitude)
                        || !(-180.0..=180.0).contains(&longitude)
                    {
                        tracing::warn!(user_id = user.id, "Discarding out-of-range location ping");
                        continue;
                    }
                    state.hub.publish_location(user.id, latitude, longitude);
                }
                Ok(ClientMessage::Ping) => conn.touch(),
                Err(e) => {
                    tracing::debug!(user_id = user.id, error = %e, "Unparseable client message");
                }
            },
            Message::Ping(_) | Message::Pong(_) => conn.touch(),
            Message::Close(_) => break,
            Message::Binary(_) => {}
        }
    }

    state.hub.disconnect(&conn);
    writer.abort();
    tracing::info!(user_id = user.id, conn_id = %conn.id, "Stream disconnected");
}
