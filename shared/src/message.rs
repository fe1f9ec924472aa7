//! Stream message types
//!
//! Typed messages carried over the per-identity WebSocket channel.
//! Serialized as `{"type": ..., "data": {...}}` so clients can dispatch
//! on the tag without knowing every variant.

use serde::{Deserialize, Serialize};

use crate::types::{OrderStatus, OrderType, Timestamp};

/// A message flowing through the event hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Driver position ping. Routed to customers subscribed to the
    /// driver's active order and mirrored to connected admins.
    DriverLocation {
        driver_id: i64,
        latitude: f64,
        longitude: f64,
        recorded_at: Timestamp,
    },
    /// Order status change notification. Critical: never silently
    /// dropped by the hub.
    OrderUpdate {
        order_id: u64,
        status: OrderStatus,
        customer_id: i64,
    },
    /// New pending order offered to eligible drivers.
    NewOrder { order_id: u64, order_type: OrderType },
}

impl StreamMessage {
    /// Critical messages must not be dropped under backpressure; the
    /// connection is closed instead and the client re-syncs via pull.
    pub fn is_critical(&self) -> bool {
        matches!(self, StreamMessage::OrderUpdate { .. })
    }
}
