//! Order API handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use shared::types::{GeoPoint, Order, OrderStatus, OrderType, StatusHistoryRecord, UserRole};
use shared::{AppError, AppResult, StreamMessage};
use validator::Validate;

use crate::auth::CurrentUser;
use crate::core::AppState;
use crate::orders::CreateOrder;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub order_type: OrderType,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    #[validate(length(max = 255))]
    pub pickup_address: Option<String>,
    #[validate(length(max = 255))]
    pub dropoff_address: Option<String>,
    #[validate(length(max = 100))]
    pub recipient_name: Option<String>,
    #[validate(length(min = 7, max = 20))]
    pub recipient_phone: Option<String>,
    #[validate(length(max = 500))]
    pub item_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

/// Create an order (customer)
pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateOrderRequest>,
) -> AppResult<Json<Order>> {
    if user.role != UserRole::Customer {
        return Err(AppError::forbidden("Only customers create orders"));
    }
    payload
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let order = state.orders.create(
        user.id,
        CreateOrder {
            order_type: payload.order_type,
            pickup: payload.pickup,
            dropoff: payload.dropoff,
            pickup_address: payload.pickup_address,
            dropoff_address: payload.dropoff_address,
            recipient_name: payload.recipient_name,
            recipient_phone: payload.recipient_phone,
            item_description: payload.item_description,
        },
    )?;

    state.dispatch.announce(&order);
    Ok(Json(order))
}

/// Open orders available for acceptance (driver)
///
/// A driver below the wallet floor is refused the list outright rather
/// than being shown work they cannot take.
pub async fn pending(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Order>>> {
    if !user.is_driver() && !user.is_admin() {
        return Err(AppError::forbidden("Drivers only"));
    }
    if user.is_driver() && !state.ledger.can_accept_orders(user.id)? {
        return Err(AppError::with_message(
            shared::ErrorCode::InsufficientFunds,
            "Top up your wallet to receive orders",
        ));
    }
    Ok(Json(state.orders.list_pending()?))
}

/// The caller's own orders: requested for customers, driven for drivers
pub async fn mine(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Order>>> {
    Ok(Json(state.orders.list_for_user(user.id, user.role)?))
}

/// Accept a pending order (driver)
pub async fn accept(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<u64>,
) -> AppResult<Json<Order>> {
    if !user.is_driver() {
        return Err(AppError::forbidden("Only drivers accept orders"));
    }

    let order = state.orders.accept(id, user.id)?;

    // Post-commit wiring: the customer follows this driver's location
    // stream until the order reaches a terminal state
    state.hub.subscribe_to_driver(order.customer_id, user.id);
    publish_order_update(&state, &order);
    Ok(Json(order))
}

/// Advance an order through its lifecycle (assigned driver)
pub async fn update_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<u64>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .orders
        .update_status(id, user.actor(), payload.status, payload.notes)?;
    publish_order_update(&state, &order);
    Ok(Json(order))
}

/// Cancel an order (customer, assigned driver or admin)
pub async fn cancel(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<u64>,
    Json(payload): Json<CancelRequest>,
) -> AppResult<Json<Order>> {
    let order =
        state
            .orders
            .update_status(id, user.actor(), OrderStatus::Cancelled, payload.reason)?;
    publish_order_update(&state, &order);
    Ok(Json(order))
}

/// Order detail, visible to its participants, admins, and any driver
/// while the order is still open
pub async fn get_by_id(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<u64>,
) -> AppResult<Json<Order>> {
    let order = state.orders.get(id)?;
    authorize_view(&order, &user)?;
    Ok(Json(order))
}

/// Status transition trail for an order
pub async fn history(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<u64>,
) -> AppResult<Json<Vec<StatusHistoryRecord>>> {
    let order = state.orders.get(id)?;
    authorize_view(&order, &user)?;
    Ok(Json(state.audit.order_history(id)?))
}

fn authorize_view(order: &Order, user: &CurrentUser) -> AppResult<()> {
    let allowed = user.is_admin()
        || order.customer_id == user.id
        || order.driver_id == Some(user.id)
        || (order.status == OrderStatus::Pending && user.is_driver());
    if !allowed {
        return Err(AppError::forbidden("Not a participant of this order"));
    }
    Ok(())
}

/// Push the committed status to both parties; tear the location
/// subscription down once the order is terminal.
fn publish_order_update(state: &AppState, order: &Order) {
    let message = StreamMessage::OrderUpdate {
        order_id: order.id,
        status: order.status,
        customer_id: order.customer_id,
    };
    state.hub.send_to_identity(order.customer_id, &message);
    if let Some(driver_id) = order.driver_id {
        state.hub.send_to_identity(driver_id, &message);
        if order.status.is_terminal() {
            state.hub.unsubscribe_from_driver(order.customer_id, driver_id);
        }
    }
}
