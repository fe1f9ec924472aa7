//! Audit projections
//!
//! Read-only views derived from the append-only records (status history,
//! ledger stream) and the order/user projections. Nothing here writes;
//! the records themselves are produced inside the transactional units of
//! the order manager and the ledger.

use chrono::Utc;
use serde::Serialize;
use shared::types::{LedgerReason, Order, OrderStatus, StatusHistoryRecord, UserRole};

use crate::store::{Store, StoreResult};

/// An order with its full transition trail
#[derive(Debug, Serialize)]
pub struct OrderLog {
    pub order: Order,
    pub history: Vec<StatusHistoryRecord>,
}

/// Filter for the admin order log view
#[derive(Debug, Default, Clone, Copy, serde::Deserialize)]
pub struct OrderLogQuery {
    /// Only orders created within the last N days
    pub days: Option<i64>,
    pub status: Option<OrderStatus>,
}

/// Per-driver operational summary
#[derive(Debug, Serialize)]
pub struct DriverStats {
    pub driver_id: i64,
    pub total_orders: u64,
    pub completed_orders: u64,
    pub cancelled_orders: u64,
    pub ratings_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
    pub wallet_balance: i64,
}

/// Platform-wide dashboard summary
#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_drivers: u64,
    pub total_customers: u64,
    pub connected_drivers: u64,
    pub orders_today: u64,
    pub completed_orders_today: u64,
    /// Net commission revenue: debited commissions minus cancellation refunds
    pub commission_revenue: i64,
}

/// Read-only audit and reporting service
#[derive(Clone)]
pub struct Audit {
    store: Store,
}

impl Audit {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Full transition trail for one order, in sequence order
    pub fn order_history(&self, order_id: u64) -> StoreResult<Vec<StatusHistoryRecord>> {
        self.store.history_for_order(order_id)
    }

    /// Orders with their trails, filtered by age and status, newest first
    pub fn order_logs(&self, query: OrderLogQuery) -> StoreResult<Vec<OrderLog>> {
        let cutoff = query
            .days
            .map(|days| Utc::now().timestamp_millis() - days * 24 * 60 * 60 * 1000);

        let orders = self.store.list_orders_where(|order| {
            cutoff.is_none_or(|c| order.created_at >= c)
                && query.status.is_none_or(|s| order.status == s)
        })?;

        let mut logs = Vec::with_capacity(orders.len());
        for order in orders {
            let history = self.store.history_for_order(order.id)?;
            logs.push(OrderLog { order, history });
        }
        Ok(logs)
    }

    /// Operational summary for one driver
    pub fn driver_stats(&self, driver_id: i64) -> StoreResult<DriverStats> {
        let orders = self
            .store
            .list_orders_where(|o| o.driver_id == Some(driver_id))?;
        let completed = orders
            .iter()
            .filter(|o| o.status == OrderStatus::Completed)
            .count() as u64;
        let cancelled = orders
            .iter()
            .filter(|o| o.status == OrderStatus::Cancelled)
            .count() as u64;

        let ratings = self.store.list_ratings_where(|r| r.driver_id == driver_id)?;
        let average_rating = if ratings.is_empty() {
            None
        } else {
            let sum: u64 = ratings.iter().map(|r| r.stars as u64).sum();
            Some(sum as f64 / ratings.len() as f64)
        };

        let wallet_balance = self
            .store
            .get_wallet(driver_id)?
            .map(|w| w.balance)
            .unwrap_or(0);

        Ok(DriverStats {
            driver_id,
            total_orders: orders.len() as u64,
            completed_orders: completed,
            cancelled_orders: cancelled,
            ratings_count: ratings.len() as u64,
            average_rating,
            wallet_balance,
        })
    }

    /// Platform-wide dashboard summary. `connected_drivers` comes from the
    /// live hub; everything else is derived from stored records.
    pub fn dashboard_stats(&self, connected_drivers: usize) -> StoreResult<DashboardStats> {
        let users = self.store.list_users()?;
        let total_drivers = users.iter().filter(|u| u.role == UserRole::Driver).count() as u64;
        let total_customers = users
            .iter()
            .filter(|u| u.role == UserRole::Customer)
            .count() as u64;

        let midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or(0);

        let today = self
            .store
            .list_orders_where(|o| o.created_at >= midnight)?;
        let completed_today = today
            .iter()
            .filter(|o| o.status == OrderStatus::Completed)
            .count() as u64;

        // Commission debits carry negative deltas; refunds hand them back
        let commission_revenue = self.store.fold_ledger(0i64, |acc, entry| match entry.reason {
            LedgerReason::Commission => acc - entry.delta,
            LedgerReason::Refund => acc - entry.delta,
            _ => acc,
        })?;

        Ok(DashboardStats {
            total_users: users.len() as u64,
            total_drivers,
            total_customers,
            connected_drivers: connected_drivers as u64,
            orders_today: today.len() as u64,
            completed_orders_today: completed_today,
            commission_revenue,
        })
    }
}
