use super::*;
use crate::ledger::Ledger;
use crate::store::Store;
use shared::types::LedgerReason;


pub(crate) const COMMISSION: i64 = 5000;

fn test_defaults() -> PlatformSettings {
    PlatformSettings {
        commission_amount: COMMISSION,
        min_wallet_floor: 0,
        updated_at: 0,
    }
}

/// Manager plus its ledger over one in-memory store
pub(crate) fn create_test_manager() -> (OrderManager, Ledger, Store) {
    let store = Store::open_in_memory().unwrap();
    let ledger = Ledger::new(store.clone(), test_defaults());
    let manager = OrderManager::new(store.clone(), ledger.clone(), test_defaults());
    (manager, ledger, store)
}

pub(crate) fn taxi_request() -> CreateOrder {
    CreateOrder {
        order_type: OrderType::Taxi,
        pickup: GeoPoint {
            latitude: 33.3152,
            longitude: 44.3661,
        },
        dropoff: GeoPoint {
            latitude: 33.3406,
            longitude: 44.4009,
        },
        pickup_address: Some("Karrada".to_string()),
        dropoff_address: None,
        recipient_name: None,
        recipient_phone: None,
        item_description: None,
    }
}

/// Mirror an identity into the user table, optionally suspended
pub(crate) fn mirror_user(store: &Store, id: i64, role: UserRole, is_active: bool) {
    let txn = store.begin_write().unwrap();
    store
        .put_user(
            &txn,
            &shared::types::User {
                id,
                name: format!("user-{id}"),
                phone: None,
                role,
                is_active,
                created_at: 0,
            },
        )
        .unwrap();
    txn.commit().unwrap();
}

pub(crate) fn fund_driver(ledger: &Ledger, driver_id: i64, amount: i64) {
    ledger
        .credit(driver_id, amount, LedgerReason::Topup, None, None)
        .unwrap();
}

pub(crate) fn driver(id: i64) -> Actor {
    Actor {
        id,
        role: UserRole::Driver,
    }
}

pub(crate) fn customer(id: i64) -> Actor {
    Actor {
        id,
        role: UserRole::Customer,
    }
}

pub(crate) fn admin(id: i64) -> Actor {
    Actor {
        id,
        role: UserRole::Admin,
    }
}
