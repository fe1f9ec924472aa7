//! End-to-end order flow over fully wired application state

use mishwar_server::{AppState, Config, Store};
use shared::StreamMessage;
use shared::types::{
    GeoPoint, LedgerReason, OrderStatus, OrderType, PlatformSettings, UserRole,
};
use shared::util::now_millis;

fn test_config() -> Config {
    Config {
        http_port: 0,
        data_dir: ".".into(),
        environment: "development".into(),
        jwt_secret: "integration-test-secret-32-chars!!!".into(),
        jwt_expiration_minutes: 60,
        default_commission_amount: 5000,
        default_min_wallet_floor: 0,
    }
}

fn test_state() -> AppState {
    AppState::with_store(test_config(), Store::open_in_memory().unwrap()).unwrap()
}

fn taxi_request() -> mishwar_server::orders::CreateOrder {
    mishwar_server::orders::CreateOrder {
        order_type: OrderType::Taxi,
        pickup: GeoPoint {
            latitude: 33.3152,
            longitude: 44.3661,
        },
        dropoff: GeoPoint {
            latitude: 33.3406,
            longitude: 44.4009,
        },
        pickup_address: Some("Karrada".into()),
        dropoff_address: Some("Mansour".into()),
        recipient_name: None,
        recipient_phone: None,
        item_description: None,
    }
}

fn actor(id: i64, role: UserRole) -> mishwar_server::orders::Actor {
    mishwar_server::orders::Actor { id, role }
}

#[tokio::test]
async fn dispatch_to_completion() {
    let state = test_state();

    // Funded driver online, another driver below the floor
    state
        .ledger
        .credit(20, 10_000, LedgerReason::Topup, None, None)
        .unwrap();
    let driver_conn = state.hub.connect(20, UserRole::Driver);
    state.hub.connect(21, UserRole::Driver);

    let txn = state.store.begin_write().unwrap();
    state
        .store
        .put_settings(
            &txn,
            &PlatformSettings {
                commission_amount: 5000,
                min_wallet_floor: 1,
                updated_at: now_millis(),
            },
        )
        .unwrap();
    txn.commit().unwrap();

    let order = state.orders.create(10, taxi_request()).unwrap();
    let notified = state.dispatch.announce(&order);
    assert_eq!(notified, 1);

    let batch = driver_conn.next_batch().await.unwrap();
    assert!(matches!(
        batch[0],
        StreamMessage::NewOrder {
            order_type: OrderType::Taxi,
            ..
        }
    ));

    // Accept, drive, complete
    let accepted = state.orders.accept(order.id, 20).unwrap();
    assert_eq!(accepted.driver_id, Some(20));
    assert_eq!(state.ledger.balance(20).unwrap(), 5000);

    let driver = actor(20, UserRole::Driver);
    for status in [OrderStatus::EnRoute, OrderStatus::Arrived, OrderStatus::Completed] {
        state
            .orders
            .update_status(order.id, driver, status, None)
            .unwrap();
    }

    let done = state.orders.get(order.id).unwrap();
    assert_eq!(done.status, OrderStatus::Completed);

    // Rate and verify the reporting rolls it all up
    state.ratings.rate(order.id, 10, 5, None).unwrap();
    let stats = state.audit.driver_stats(20).unwrap();
    assert_eq!(stats.completed_orders, 1);
    assert_eq!(stats.average_rating, Some(5.0));
    assert_eq!(stats.wallet_balance, 5000);

    let dashboard = state.audit.dashboard_stats(2).unwrap();
    assert_eq!(dashboard.commission_revenue, 5000);
}

#[tokio::test]
async fn cancellation_refunds_and_settings_are_not_retroactive() {
    let state = test_state();
    state
        .ledger
        .credit(20, 10_000, LedgerReason::Topup, None, None)
        .unwrap();

    let first = state.orders.create(10, taxi_request()).unwrap();

    // Commission raised between the two orders
    let txn = state.store.begin_write().unwrap();
    state
        .store
        .put_settings(
            &txn,
            &PlatformSettings {
                commission_amount: 7000,
                min_wallet_floor: 0,
                updated_at: now_millis(),
            },
        )
        .unwrap();
    txn.commit().unwrap();

    let second = state.orders.create(10, taxi_request()).unwrap();
    assert_eq!(first.commission_amount, 5000);
    assert_eq!(second.commission_amount, 7000);

    // The earlier order still debits its snapshot, not the new rate
    state.orders.accept(first.id, 20).unwrap();
    assert_eq!(state.ledger.balance(20).unwrap(), 5000);

    state
        .orders
        .update_status(
            first.id,
            actor(10, UserRole::Customer),
            OrderStatus::Cancelled,
            Some("plans changed".into()),
        )
        .unwrap();
    assert_eq!(state.ledger.balance(20).unwrap(), 10_000);

    let refund = state
        .ledger
        .history(20, 10)
        .unwrap()
        .into_iter()
        .find(|e| e.reason == LedgerReason::Refund)
        .unwrap();
    assert_eq!(refund.delta, 5000);
    assert_eq!(refund.order_id, Some(first.id));
}

#[tokio::test]
async fn losing_driver_sees_conflict_and_keeps_funds() {
    let state = test_state();
    for driver_id in [20i64, 21] {
        state
            .ledger
            .credit(driver_id, 10_000, LedgerReason::Topup, None, None)
            .unwrap();
    }

    let order = state.orders.create(10, taxi_request()).unwrap();
    state.orders.accept(order.id, 20).unwrap();

    let err = state.orders.accept(order.id, 21).unwrap_err();
    assert!(matches!(
        err,
        mishwar_server::orders::OrderError::AlreadyAccepted(_)
    ));
    assert_eq!(state.ledger.balance(21).unwrap(), 10_000);
    assert_eq!(state.ledger.history(21, 10).unwrap().len(), 1);
}
