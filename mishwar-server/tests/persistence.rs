//! Durable state survives a reopen

use mishwar_server::{AppState, Config, Store};
use shared::types::{GeoPoint, LedgerReason, OrderStatus, OrderType};

fn config_for(dir: &std::path::Path) -> Config {
    Config {
        http_port: 0,
        data_dir: dir.to_string_lossy().into_owned(),
        environment: "development".into(),
        jwt_secret: "integration-test-secret-32-chars!!!".into(),
        jwt_expiration_minutes: 60,
        default_commission_amount: 5000,
        default_min_wallet_floor: 0,
    }
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
        pickup_address: None,
        dropoff_address: None,
        recipient_name: None,
        recipient_phone: None,
        item_description: None,
    }
}

#[test]
fn orders_ledger_and_history_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());

    let order_id;
    {
        let state = AppState::new(config.clone()).unwrap();
        state
            .ledger
            .credit(20, 10_000, LedgerReason::Topup, None, None)
            .unwrap();
        let order = state.orders.create(10, taxi_request()).unwrap();
        state.orders.accept(order.id, 20).unwrap();
        order_id = order.id;
        // state (and its database handle) dropped here
    }

    let store = Store::open(config.db_path()).unwrap();
    let state = AppState::with_store(config, store).unwrap();

    let order = state.orders.get(order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Accepted);
    assert_eq!(order.driver_id, Some(20));
    assert_eq!(state.ledger.balance(20).unwrap(), 5000);

    let history = state.audit.order_history(order_id).unwrap();
    assert_eq!(history.len(), 2);

    // Id counters resume past committed ids instead of reusing them
    let next = state.orders.create(11, taxi_request()).unwrap();
    assert!(next.id > order_id);

    // A late accept against the reopened database still races correctly
    let err = state.orders.accept(order_id, 21).unwrap_err();
    assert!(matches!(
        err,
        mishwar_server::orders::OrderError::AlreadyAccepted(_)
    ));
}
