//! Order status state machine
//!
//! The only edges that exist:
//!
//! ```text
//! pending → accepted → en_route → arrived → completed
//! pending → cancelled
//! accepted → cancelled
//! ```
//!
//! Everything else is rejected. Transitions are strictly forward; nothing
//! may skip the accepted gate except cancellation of a pending order.

use shared::types::OrderStatus;

/// Whether `from → to` is an allowed edge
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Pending, Accepted)
            | (Accepted, EnRoute)
            | (EnRoute, Arrived)
            | (Arrived, Completed)
            | (Pending, Cancelled)
            | (Accepted, Cancelled)
    )
}
