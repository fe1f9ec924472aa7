//! Dispatch coordinator
//!
//! Fans a freshly created order out to eligible drivers and answers
//! eligibility queries. Stateless by design: the connected set lives in
//! the event hub, wallet state in the ledger, account state in the store.
//! Offer/assignment logic stays in the order manager; dispatch only
//! decides who hears about new work.

use shared::StreamMessage;
use shared::types::Order;

use crate::ledger::{Ledger, LedgerResult};
use crate::live::EventHub;
use crate::store::Store;

/// New-order fan-out and driver eligibility
#[derive(Clone)]
pub struct Dispatch {
    store: Store,
    ledger: Ledger,
    hub: EventHub,
}

impl Dispatch {
    pub fn new(store: Store, ledger: Ledger, hub: EventHub) -> Self {
        Self { store, ledger, hub }
    }

    /// Whether a driver is eligible to receive and accept work right now:
    /// account active, wallet active, balance at or above the floor.
    /// Connectivity is checked separately at fan-out time.
    pub fn is_eligible(&self, driver_id: i64) -> LedgerResult<bool> {
        let account_active = self
            .store
            .get_user(driver_id)?
            .map(|u| u.is_active)
            // Unknown accounts are not blocked here; identity is minted
            // externally and may not be mirrored yet
            .unwrap_or(true);
        Ok(account_active && self.ledger.can_accept_orders(driver_id)?)
    }

    /// Announce a new pending order to every connected, eligible driver.
    ///
    /// Best-effort: delivery failures are the hub's concern, eligibility
    /// is re-checked authoritatively at accept time. Returns the number
    /// of drivers notified.
    pub fn announce(&self, order: &Order) -> usize {
        let message = StreamMessage::NewOrder {
            order_id: order.id,
            order_type: order.order_type,
        };

        let mut notified = 0;
        for driver_id in self.hub.connected_drivers() {
            match self.is_eligible(driver_id) {
                Ok(true) => {
                    self.hub.send_to_identity(driver_id, &message);
                    notified += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(driver_id, error = %e, "Eligibility check failed, skipping driver");
                }
            }
        }
        tracing::debug!(order_id = order.id, notified, "New order announced");
        notified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::{
        GeoPoint, OrderStatus, OrderType, PlatformSettings, User, UserRole,
    };
    use shared::util::now_millis;

    fn test_dispatch(floor: i64) -> (Dispatch, Store, Ledger, EventHub) {
        let store = Store::open_in_memory().unwrap();
        let defaults = PlatformSettings {
            commission_amount: 5000,
            min_wallet_floor: floor,
            updated_at: 0,
        };
        let ledger = Ledger::new(store.clone(), defaults);
        let hub = EventHub::new();
        let dispatch = Dispatch::new(store.clone(), ledger.clone(), hub.clone());
        (dispatch, store, ledger, hub)
    }

    fn put_user(store: &Store, id: i64, role: UserRole, is_active: bool) {
        let txn = store.begin_write().unwrap();
        store
            .put_user(
                &txn,
                &User {
                    id,
                    name: format!("user-{id}"),
                    phone: None,
                    role,
                    is_active,
                    created_at: now_millis(),
                },
            )
            .unwrap();
        txn.commit().unwrap();
    }

    fn pending_order(id: u64) -> Order {
        Order {
            id,
            order_type: OrderType::Taxi,
            status: OrderStatus::Pending,
            customer_id: 10,
            driver_id: None,
            pickup: GeoPoint {
                latitude: 33.3152,
                longitude: 44.3661,
            },
            dropoff: GeoPoint {
                latitude: 33.34,
                longitude: 44.4,
            },
            pickup_address: None,
            dropoff_address: None,
            commission_amount: 5000,
            recipient_name: None,
            recipient_phone: None,
            item_description: None,
            created_at: now_millis(),
            accepted_at: None,
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
        }
    }

    #[tokio::test]
    async fn announce_reaches_only_connected_eligible_drivers() {
        let (dispatch, store, ledger, hub) = test_dispatch(1000);
        put_user(&store, 20, UserRole::Driver, true);
        put_user(&store, 21, UserRole::Driver, true);
        put_user(&store, 22, UserRole::Driver, true);

        // 20: funded and connected. 21: connected but below floor.
        // 22: funded but offline.
        ledger
            .credit(20, 5000, shared::types::LedgerReason::Topup, None, None)
            .unwrap();
        ledger
            .credit(22, 5000, shared::types::LedgerReason::Topup, None, None)
            .unwrap();
        let funded = hub.connect(20, UserRole::Driver);
        let broke = hub.connect(21, UserRole::Driver);

        let notified = dispatch.announce(&pending_order(1));
        assert_eq!(notified, 1);

        let batch = funded.next_batch().await.unwrap();
        assert!(matches!(batch[0], StreamMessage::NewOrder { order_id: 1, .. }));
        assert_eq!(broke.queue_len(), 0);
    }

    #[test]
    fn suspended_account_is_ineligible_even_when_funded() {
        let (dispatch, store, ledger, _) = test_dispatch(0);
        put_user(&store, 20, UserRole::Driver, false);
        ledger
            .credit(20, 10_000, shared::types::LedgerReason::Topup, None, None)
            .unwrap();
        assert!(!dispatch.is_eligible(20).unwrap());
    }

    #[test]
    fn suspended_wallet_is_ineligible() {
        let (dispatch, store, ledger, _) = test_dispatch(0);
        put_user(&store, 20, UserRole::Driver, true);
        ledger
            .credit(20, 10_000, shared::types::LedgerReason::Topup, None, None)
            .unwrap();
        ledger.set_wallet_active(20, false).unwrap();
        assert!(!dispatch.is_eligible(20).unwrap());
    }

    #[test]
    fn unseen_driver_with_zero_floor_is_eligible() {
        let (dispatch, _, _, _) = test_dispatch(0);
        assert!(dispatch.is_eligible(77).unwrap());
    }

    #[test]
    fn announce_with_no_drivers_is_a_no_op() {
        let (dispatch, _, _, _) = test_dispatch(0);
        assert_eq!(dispatch.announce(&pending_order(1)), 0);
    }
}
