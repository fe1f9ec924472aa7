//! OrderManager - atomic order transitions
//!
//! The only writer of order and status-history tables. Every operation is
//! one redb write transaction:
//!
//! ```text
//! accept(order_id, driver_id)
//!     ├─ 1. Begin write transaction
//!     ├─ 2. Load order, compare-and-set Pending → Accepted + driver_id
//!     ├─ 3. Debit commission (ledger, same transaction)
//!     ├─ 4. Append status history record
//!     └─ 5. Commit, or abort the whole unit on any failure
//! ```
//!
//! The compare-and-set in step 2 is the authoritative at-most-one-winner
//! guarantee; any wallet precheck done by callers is advisory only. A
//! failed debit aborts the transaction, so a partially accepted order
//! (accepted but not charged) is never observable.

use shared::types::{
    GeoPoint, Order, OrderStatus, OrderType, PlatformSettings, StatusHistoryRecord, UserRole,
};
use shared::util::now_millis;
use thiserror::Error;

use crate::ledger::{Ledger, LedgerError};
use crate::orders::machine;
use crate::store::{Store, StoreError};

/// Manager errors
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(u64),

    #[error("Order no longer available: {0}")]
    AlreadyAccepted(u64),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: i64, required: i64 },

    #[error("Wallet is suspended: driver {0}")]
    WalletInactive(i64),

    #[error("Account is suspended: user {0}")]
    AccountSuspended(i64),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<LedgerError> for OrderError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds { balance, required } => {
                OrderError::InsufficientFunds { balance, required }
            }
            LedgerError::WalletInactive(driver_id) => OrderError::WalletInactive(driver_id),
            LedgerError::InvalidAmount(v) => OrderError::Validation(format!("invalid amount {v}")),
            LedgerError::Store(e) => OrderError::Store(e),
        }
    }
}

/// Who is requesting a transition
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub id: i64,
    pub role: UserRole,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Parameters for order creation
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub order_type: OrderType,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_phone: Option<String>,
    pub item_description: Option<String>,
}

/// Order lifecycle manager
#[derive(Clone)]
pub struct OrderManager {
    store: Store,
    ledger: Ledger,
    defaults: PlatformSettings,
}

impl OrderManager {
    pub fn new(store: Store, ledger: Ledger, defaults: PlatformSettings) -> Self {
        Self {
            store,
            ledger,
            defaults,
        }
    }

    /// Create a pending order for a customer.
    ///
    /// The commission amount is snapshotted from the settings visible in
    /// this transaction and never re-read for the order's lifetime.
    pub fn create(&self, customer_id: i64, params: CreateOrder) -> Result<Order, OrderError> {
        self.require_active_account(customer_id)?;
        validate_point(&params.pickup, "pickup")?;
        validate_point(&params.dropoff, "dropoff")?;
        if params.order_type == OrderType::Delivery && params.recipient_phone.is_none() {
            return Err(OrderError::Validation(
                "delivery orders require a recipient phone".into(),
            ));
        }

        let txn = self.store.begin_write()?;
        let id = self.store.next_order_id(&txn)?;
        let settings = self.store.get_settings_txn(&txn, &self.defaults)?;
        let now = now_millis();

        let order = Order {
            id,
            order_type: params.order_type,
            status: OrderStatus::Pending,
            customer_id,
            driver_id: None,
            pickup: params.pickup,
            dropoff: params.dropoff,
            pickup_address: params.pickup_address,
            dropoff_address: params.dropoff_address,
            commission_amount: settings.commission_amount,
            recipient_name: params.recipient_name,
            recipient_phone: params.recipient_phone,
            item_description: params.item_description,
            created_at: now,
            accepted_at: None,
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
        };
        self.store.put_order(&txn, &order)?;
        self.append_history(&txn, &order, None, customer_id, None)?;
        txn.commit().map_err(StoreError::from)?;

        tracing::info!(
            order_id = order.id,
            customer_id,
            order_type = ?order.order_type,
            commission = order.commission_amount,
            "Order created"
        );
        Ok(order)
    }

    /// Driver accepts a pending order.
    ///
    /// Compare-and-set on (status, driver_id) plus the commission debit
    /// plus the history record, all in one write transaction. Exactly one
    /// concurrent caller wins; losers observe `AlreadyAccepted`.
    pub fn accept(&self, order_id: u64, driver_id: i64) -> Result<Order, OrderError> {
        self.require_active_account(driver_id)?;

        let txn = self.store.begin_write()?;
        let mut order = self
            .store
            .get_order_txn(&txn, order_id)?
            .ok_or(OrderError::NotFound(order_id))?;

        match order.status {
            OrderStatus::Pending => {}
            // A committed cancellation makes the late accept an invalid
            // transition, not a lost race
            OrderStatus::Cancelled => {
                return Err(OrderError::InvalidTransition {
                    from: OrderStatus::Cancelled,
                    to: OrderStatus::Accepted,
                });
            }
            _ => return Err(OrderError::AlreadyAccepted(order_id)),
        }

        let floor = self
            .store
            .get_settings_txn(&txn, &self.defaults)?
            .min_wallet_floor;
        // Aborting the transaction on debit failure rolls the CAS back;
        // acceptance and debit are one logical unit
        self.ledger
            .debit_txn(&txn, driver_id, order.commission_amount, order_id, floor)?;

        let from = order.status;
        order.status = OrderStatus::Accepted;
        order.driver_id = Some(driver_id);
        order.accepted_at = Some(now_millis());
        self.store.put_order(&txn, &order)?;
        self.append_history(&txn, &order, Some(from), driver_id, None)?;
        txn.commit().map_err(StoreError::from)?;

        tracing::info!(order_id, driver_id, "Order accepted");
        Ok(order)
    }

    /// Advance or cancel an order.
    ///
    /// Authorization: the assigned driver advances en_route/arrived/
    /// completed; the customer or an admin cancels a pending order; the
    /// customer, the assigned driver or an admin cancels an accepted order
    /// (which refunds the commission in the same transaction).
    pub fn update_status(
        &self,
        order_id: u64,
        actor: Actor,
        new_status: OrderStatus,
        notes: Option<String>,
    ) -> Result<Order, OrderError> {
        if new_status == OrderStatus::Pending || new_status == OrderStatus::Accepted {
            // Pending is never a target; Accepted only via accept()
            return Err(OrderError::Validation(format!(
                "status {new_status} cannot be requested directly"
            )));
        }

        let txn = self.store.begin_write()?;
        let mut order = self
            .store
            .get_order_txn(&txn, order_id)?
            .ok_or(OrderError::NotFound(order_id))?;

        let from = order.status;
        if !machine::can_transition(from, new_status) {
            return Err(OrderError::InvalidTransition {
                from,
                to: new_status,
            });
        }
        self.authorize(&order, actor, new_status)?;

        let now = now_millis();
        order.status = new_status;
        match new_status {
            OrderStatus::Completed => order.completed_at = Some(now),
            OrderStatus::Cancelled => {
                order.cancelled_at = Some(now);
                order.cancelled_by = Some(actor.id);
                order.cancellation_reason = notes.clone();

                // Cancelling an accepted order refunds the commission that
                // was debited at acceptance
                if from == OrderStatus::Accepted
                    && let Some(driver_id) = order.driver_id
                {
                    self.ledger.credit_txn(
                        &txn,
                        driver_id,
                        order.commission_amount,
                        shared::types::LedgerReason::Refund,
                        Some(order_id),
                        Some(format!("Refund for cancelled order #{order_id}")),
                    )?;
                }
            }
            _ => {}
        }

        self.store.put_order(&txn, &order)?;
        self.append_history(&txn, &order, Some(from), actor.id, notes)?;
        txn.commit().map_err(StoreError::from)?;

        tracing::info!(
            order_id,
            actor_id = actor.id,
            from = %from,
            to = %new_status,
            "Order status updated"
        );
        Ok(order)
    }

    // ========== Queries ==========

    pub fn get(&self, order_id: u64) -> Result<Order, OrderError> {
        self.store
            .get_order(order_id)?
            .ok_or(OrderError::NotFound(order_id))
    }

    pub fn list_pending(&self) -> Result<Vec<Order>, OrderError> {
        Ok(self.store.list_pending_orders()?)
    }

    /// Order history for one user: driven orders for drivers, requested
    /// orders otherwise
    pub fn list_for_user(&self, user_id: i64, role: UserRole) -> Result<Vec<Order>, OrderError> {
        let orders = match role {
            UserRole::Driver => self
                .store
                .list_orders_where(|o| o.driver_id == Some(user_id))?,
            _ => self.store.list_orders_where(|o| o.customer_id == user_id)?,
        };
        Ok(orders)
    }

    /// Suspended accounts may not create or accept orders. Identities not
    /// mirrored into the user table pass; suspension is an explicit record.
    fn require_active_account(&self, user_id: i64) -> Result<(), OrderError> {
        if self.store.get_user(user_id)?.is_some_and(|u| !u.is_active) {
            return Err(OrderError::AccountSuspended(user_id));
        }
        Ok(())
    }

    fn authorize(
        &self,
        order: &Order,
        actor: Actor,
        new_status: OrderStatus,
    ) -> Result<(), OrderError> {
        match new_status {
            OrderStatus::Cancelled => {
                let allowed = actor.is_admin()
                    || actor.id == order.customer_id
                    || (order.status == OrderStatus::Accepted && order.driver_id == Some(actor.id));
                if !allowed {
                    return Err(OrderError::NotAuthorized(
                        "only the customer, the assigned driver or an admin may cancel".into(),
                    ));
                }
            }
            _ => {
                if order.driver_id != Some(actor.id) {
                    return Err(OrderError::NotAuthorized(
                        "only the assigned driver may advance the order".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn append_history(
        &self,
        txn: &redb::WriteTransaction,
        order: &Order,
        from: Option<OrderStatus>,
        actor_id: i64,
        notes: Option<String>,
    ) -> Result<(), OrderError> {
        let seq = self.store.next_history_seq(txn, order.id)?;
        let record = StatusHistoryRecord {
            order_id: order.id,
            seq,
            from_status: from,
            to_status: order.status,
            actor_id,
            notes,
            timestamp: now_millis(),
        };
        self.store.append_history(txn, &record)?;
        Ok(())
    }
}

fn validate_point(point: &GeoPoint, field: &str) -> Result<(), OrderError> {
    if !(-90.0..=90.0).contains(&point.latitude) || !(-180.0..=180.0).contains(&point.longitude) {
        return Err(OrderError::Validation(format!(
            "{field} coordinates out of range"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
