//! Presence & Event Hub
//!
//! Maintains the live connection set per identity and routes typed
//! [`StreamMessage`]s. Delivery is best-effort: the audit trail is the
//! durable source of truth, absent consumers are simply skipped.
//!
//! ```text
//! publisher ──▶ EventHub ──▶ Connection (bounded queue) ──▶ WS writer task
//!                  │
//!                  ├── by_identity: identity → connection ids (multi-device)
//!                  ├── driver_watchers: driver → subscribed customers
//!                  └── last_locations: driver → latest ping (admin snapshot)
//! ```
//!
//! # Backpressure
//!
//! Every connection owns a bounded queue drained by its writer task; a
//! slow peer never blocks the publisher or other consumers. On overflow
//! the oldest non-critical queued message is dropped (freshness over
//! completeness, right for location streams). Critical messages
//! (`order_update`) are never silently dropped: if no room can be made,
//! the connection is closed and the client re-syncs via pull queries.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use shared::StreamMessage;
use shared::types::UserRole;
use shared::util::now_millis;
use tokio::sync::Notify;
use uuid::Uuid;

/// Outbound queue capacity per connection
const QUEUE_CAPACITY: usize = 64;

/// One live transport session for an identity
pub struct Connection {
    pub id: Uuid,
    pub identity_id: i64,
    pub role: UserRole,
    queue: Mutex<VecDeque<StreamMessage>>,
    notify: Notify,
    closed: AtomicBool,
    last_seen: AtomicI64,
}

impl Connection {
    fn new(identity_id: i64, role: UserRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity_id,
            role,
            queue: Mutex::new(VecDeque::with_capacity(QUEUE_CAPACITY)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            last_seen: AtomicI64::new(now_millis()),
        }
    }

    /// Queue a message for delivery. Returns `false` when the connection
    /// was closed (critical overflow), in which case the writer task will
    /// tear the transport down.
    fn enqueue(&self, message: StreamMessage) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        let mut queue = self.queue.lock();
        if queue.len() >= QUEUE_CAPACITY {
            // Make room by dropping the oldest non-critical message
            let victim = queue.iter().position(|m| !m.is_critical());
            match victim {
                Some(idx) => {
                    queue.remove(idx);
                }
                None if message.is_critical() => {
                    // Full of criticals and another critical arrived: the
                    // consumer is hopeless, close rather than drop
                    drop(queue);
                    self.close();
                    return false;
                }
                None => {
                    // Stale location against a queue full of criticals:
                    // dropping the incoming ping is harmless
                    return true;
                }
            }
        }
        queue.push_back(message);
        drop(queue);
        self.notify.notify_one();
        true
    }

    /// Await the next batch of queued messages; `None` once the
    /// connection is closed.
    pub async fn next_batch(&self) -> Option<Vec<StreamMessage>> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            {
                let mut queue = self.queue.lock();
                if !queue.is_empty() {
                    return Some(queue.drain(..).collect());
                }
            }
            self.notify.notified().await;
        }
    }

    /// Messages currently awaiting delivery
    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Record inbound activity
    pub fn touch(&self) {
        self.last_seen.store(now_millis(), Ordering::Relaxed);
    }

    pub fn last_seen(&self) -> i64 {
        self.last_seen.load(Ordering::Relaxed)
    }
}

/// Latest known driver position (last-write-wins)
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct LastLocation {
    pub driver_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: i64,
}

/// Live connection registry and message router
#[derive(Clone, Default)]
pub struct EventHub {
    connections: Arc<DashMap<Uuid, Arc<Connection>>>,
    /// identity → connection ids (multi-device: many physical connections)
    by_identity: Arc<DashMap<i64, DashSet<Uuid>>>,
    /// driver → customers subscribed to his location stream
    driver_watchers: Arc<DashMap<i64, DashSet<i64>>>,
    /// driver → latest ping, for the admin pull snapshot
    last_locations: Arc<DashMap<i64, LastLocation>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection for an identity. Safe under concurrent
    /// calls for the same identity.
    pub fn connect(&self, identity_id: i64, role: UserRole) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(identity_id, role));
        self.connections.insert(conn.id, conn.clone());
        self.by_identity
            .entry(identity_id)
            .or_default()
            .insert(conn.id);
        tracing::debug!(identity_id, conn_id = %conn.id, "Connection registered");
        conn
    }

    /// Remove a connection; the identity stays subscribed through its
    /// remaining connections, if any.
    pub fn disconnect(&self, conn: &Connection) {
        conn.close();
        self.connections.remove(&conn.id);
        if let Some(set) = self.by_identity.get(&conn.identity_id) {
            set.remove(&conn.id);
            if set.is_empty() {
                drop(set);
                self.by_identity
                    .remove_if(&conn.identity_id, |_, s| s.is_empty());
            }
        }
        tracing::debug!(identity_id = conn.identity_id, conn_id = %conn.id, "Connection removed");
    }

    /// Deliver to every active connection of one identity. Dropped or
    /// absent consumers are not an error to the publisher.
    pub fn send_to_identity(&self, identity_id: i64, message: &StreamMessage) {
        let Some(conn_ids) = self.by_identity.get(&identity_id) else {
            return;
        };
        for conn_id in conn_ids.iter() {
            if let Some(conn) = self.connections.get(&*conn_id)
                && !conn.enqueue(message.clone())
            {
                tracing::warn!(
                    identity_id,
                    conn_id = %*conn_id,
                    "Connection closed on critical overflow"
                );
            }
        }
    }

    /// Identity ids of all connected drivers (dispatch fan-out set)
    pub fn connected_drivers(&self) -> Vec<i64> {
        self.connections
            .iter()
            .filter(|entry| entry.role == UserRole::Driver && !entry.is_closed())
            .map(|entry| entry.identity_id)
            .collect::<DashSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn is_connected(&self, identity_id: i64) -> bool {
        self.by_identity
            .get(&identity_id)
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }

    // ========== Location stream ==========

    /// Subscribe a customer to a driver's location stream (set up when
    /// the driver accepts the customer's order)
    pub fn subscribe_to_driver(&self, customer_id: i64, driver_id: i64) {
        self.driver_watchers
            .entry(driver_id)
            .or_default()
            .insert(customer_id);
    }

    /// Tear down one customer's subscription (terminal order status)
    pub fn unsubscribe_from_driver(&self, customer_id: i64, driver_id: i64) {
        if let Some(watchers) = self.driver_watchers.get(&driver_id) {
            watchers.remove(&customer_id);
        }
    }

    /// Route a driver location ping to subscribed customers and mirror it
    /// to connected admins; remember it for the admin pull snapshot.
    pub fn publish_location(&self, driver_id: i64, latitude: f64, longitude: f64) {
        let recorded_at = now_millis();
        self.last_locations.insert(
            driver_id,
            LastLocation {
                driver_id,
                latitude,
                longitude,
                recorded_at,
            },
        );

        let message = StreamMessage::DriverLocation {
            driver_id,
            latitude,
            longitude,
            recorded_at,
        };

        if let Some(watchers) = self.driver_watchers.get(&driver_id) {
            for customer_id in watchers.iter() {
                self.send_to_identity(*customer_id, &message);
            }
        }

        for entry in self.connections.iter() {
            if entry.role == UserRole::Admin {
                entry.enqueue(message.clone());
            }
        }
    }

    /// Latest known position per driver
    pub fn last_known_locations(&self) -> Vec<LastLocation> {
        self.last_locations.iter().map(|e| *e.value()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::{OrderStatus, OrderType};

    fn order_update(order_id: u64) -> StreamMessage {
        StreamMessage::OrderUpdate {
            order_id,
            status: OrderStatus::Accepted,
            customer_id: 10,
        }
    }

    #[tokio::test]
    async fn subscribed_customer_receives_location_pings() {
        let hub = EventHub::new();
        let conn = hub.connect(10, UserRole::Customer);
        hub.subscribe_to_driver(10, 20);

        hub.publish_location(20, 33.31, 44.36);
        hub.publish_location(20, 33.32, 44.37);

        let batch = conn.next_batch().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(matches!(
            batch[0],
            StreamMessage::DriverLocation { driver_id: 20, .. }
        ));
    }

    #[tokio::test]
    async fn publish_after_disconnect_is_silent() {
        // No error to the publisher once the consumer is gone
        let hub = EventHub::new();
        let conn = hub.connect(10, UserRole::Customer);
        hub.subscribe_to_driver(10, 20);
        hub.disconnect(&conn);

        hub.publish_location(20, 33.31, 44.36);
        assert!(conn.next_batch().await.is_none());
        assert!(!hub.is_connected(10));
    }

    #[tokio::test]
    async fn unsubscribed_customer_stops_receiving() {
        let hub = EventHub::new();
        let conn = hub.connect(10, UserRole::Customer);
        hub.subscribe_to_driver(10, 20);
        hub.publish_location(20, 33.31, 44.36);
        hub.unsubscribe_from_driver(10, 20);
        hub.publish_location(20, 33.32, 44.37);

        let batch = conn.next_batch().await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn overflow_drops_oldest_location() {
        let hub = EventHub::new();
        let conn = hub.connect(10, UserRole::Customer);
        hub.subscribe_to_driver(10, 20);

        for i in 0..(QUEUE_CAPACITY + 5) {
            hub.publish_location(20, i as f64, 44.36);
        }

        let batch = conn.next_batch().await.unwrap();
        assert_eq!(batch.len(), QUEUE_CAPACITY);
        // The oldest five pings were dropped; the newest survived
        match batch.last().unwrap() {
            StreamMessage::DriverLocation { latitude, .. } => {
                assert_eq!(*latitude, (QUEUE_CAPACITY + 4) as f64);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        match batch.first().unwrap() {
            StreamMessage::DriverLocation { latitude, .. } => {
                assert_eq!(*latitude, 5.0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn critical_messages_displace_locations_but_never_drop() {
        let hub = EventHub::new();
        let conn = hub.connect(10, UserRole::Customer);
        hub.subscribe_to_driver(10, 20);

        for i in 0..QUEUE_CAPACITY {
            hub.publish_location(20, i as f64, 44.36);
        }
        hub.send_to_identity(10, &order_update(1));
        assert!(!conn.is_closed());

        let batch = conn.next_batch().await.unwrap();
        let criticals = batch.iter().filter(|m| m.is_critical()).count();
        assert_eq!(criticals, 1);
        assert_eq!(batch.len(), QUEUE_CAPACITY);
    }

    #[tokio::test]
    async fn critical_overflow_closes_the_connection() {
        let hub = EventHub::new();
        let conn = hub.connect(10, UserRole::Customer);

        for i in 0..QUEUE_CAPACITY {
            hub.send_to_identity(10, &order_update(i as u64));
        }
        assert!(!conn.is_closed());
        hub.send_to_identity(10, &order_update(999));
        assert!(conn.is_closed());
        assert!(conn.next_batch().await.is_none());
    }

    #[tokio::test]
    async fn full_critical_queue_sheds_incoming_locations() {
        let hub = EventHub::new();
        let conn = hub.connect(10, UserRole::Customer);
        hub.subscribe_to_driver(10, 20);

        for i in 0..QUEUE_CAPACITY {
            hub.send_to_identity(10, &order_update(i as u64));
        }
        hub.publish_location(20, 33.31, 44.36);
        // Connection stays open, the stale ping is simply shed
        assert!(!conn.is_closed());
        let batch = conn.next_batch().await.unwrap();
        assert!(batch.iter().all(|m| m.is_critical()));
    }

    #[tokio::test]
    async fn multi_device_identities_receive_on_every_connection() {
        let hub = EventHub::new();
        let phone = hub.connect(10, UserRole::Customer);
        let tablet = hub.connect(10, UserRole::Customer);

        hub.send_to_identity(10, &order_update(1));

        assert_eq!(phone.next_batch().await.unwrap().len(), 1);
        assert_eq!(tablet.next_batch().await.unwrap().len(), 1);

        hub.disconnect(&phone);
        assert!(hub.is_connected(10));
        hub.send_to_identity(10, &order_update(2));
        assert_eq!(tablet.next_batch().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn admins_mirror_all_location_pings() {
        let hub = EventHub::new();
        let admin = hub.connect(1, UserRole::Admin);
        hub.publish_location(20, 33.31, 44.36);

        let batch = admin.next_batch().await.unwrap();
        assert_eq!(batch.len(), 1);

        let snapshot = hub.last_known_locations();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].driver_id, 20);
    }

    #[tokio::test]
    async fn connected_drivers_deduplicates_devices() {
        let hub = EventHub::new();
        hub.connect(20, UserRole::Driver);
        hub.connect(20, UserRole::Driver);
        hub.connect(21, UserRole::Driver);
        hub.connect(10, UserRole::Customer);

        let mut drivers = hub.connected_drivers();
        drivers.sort_unstable();
        assert_eq!(drivers, vec![20, 21]);
    }

    #[test]
    fn new_order_broadcast_is_not_critical() {
        // new_order fan-out may be shed under pressure; drivers refresh
        // the pending list on reconnect
        let msg = StreamMessage::NewOrder {
            order_id: 1,
            order_type: OrderType::Taxi,
        };
        assert!(!msg.is_critical());
    }
}
