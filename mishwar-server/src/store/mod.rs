//! redb-backed storage layer
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` | `order_id` | `Order` | Current order projection |
//! | `pending_orders` | `order_id` | `()` | Pending order index |
//! | `status_history` | `(order_id, seq)` | `StatusHistoryRecord` | Transition log (append-only) |
//! | `wallets` | `driver_id` | `WalletAccount` | Wallet projection |
//! | `ledger` | `entry_id` | `LedgerEntry` | Ledger stream (append-only) |
//! | `ledger_by_driver` | `(driver_id, entry_id)` | `()` | Per-driver ledger index |
//! | `users` | `user_id` | `User` | Platform users |
//! | `ratings` | `order_id` | `Rating` | One rating per order |
//! | `settings` | `key` | `PlatformSettings` | Admin-mutable settings |
//! | `counters` | `key` | `u64` | Monotonic id counters |
//!
//! # Atomicity
//!
//! Every multi-table invariant (accept + debit + history record) executes
//! inside a single `WriteTransaction`. redb admits one writer at a time,
//! which also serializes concurrent debits against one driver: the second
//! debit always observes the first one's committed balance.

use redb::{
    Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use shared::types::{
    LedgerEntry, Order, OrderStatus, PlatformSettings, Rating, StatusHistoryRecord, User,
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Current order projections: key = order_id, value = JSON-serialized Order
const ORDERS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("orders");

/// Pending order index: key = order_id, value = empty (existence check)
const PENDING_ORDERS_TABLE: TableDefinition<u64, ()> = TableDefinition::new("pending_orders");

/// Status transition log: key = (order_id, seq), value = JSON-serialized StatusHistoryRecord
const STATUS_HISTORY_TABLE: TableDefinition<(u64, u64), &[u8]> =
    TableDefinition::new("status_history");

/// Wallet projections: key = driver_id, value = JSON-serialized WalletAccount
const WALLETS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("wallets");

/// Ledger stream: key = entry_id, value = JSON-serialized LedgerEntry
const LEDGER_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("ledger");

/// Per-driver ledger index: key = (driver_id, entry_id), value = empty
const LEDGER_BY_DRIVER_TABLE: TableDefinition<(i64, u64), ()> =
    TableDefinition::new("ledger_by_driver");

/// Platform users: key = user_id, value = JSON-serialized User
const USERS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("users");

/// Ratings: key = order_id, value = JSON-serialized Rating
const RATINGS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("ratings");

/// Settings: key = settings key, value = JSON-serialized PlatformSettings
const SETTINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");

/// Monotonic counters: key = counter name, value = u64
const COUNTERS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("counters");

const ORDER_SEQ_KEY: &str = "order_seq";
const LEDGER_SEQ_KEY: &str = "ledger_seq";
const PLATFORM_SETTINGS_KEY: &str = "platform";

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Platform storage backed by redb
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = Database::create(path)?;
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(PENDING_ORDERS_TABLE)?;
            let _ = write_txn.open_table(STATUS_HISTORY_TABLE)?;
            let _ = write_txn.open_table(WALLETS_TABLE)?;
            let _ = write_txn.open_table(LEDGER_TABLE)?;
            let _ = write_txn.open_table(LEDGER_BY_DRIVER_TABLE)?;
            let _ = write_txn.open_table(USERS_TABLE)?;
            let _ = write_txn.open_table(RATINGS_TABLE)?;
            let _ = write_txn.open_table(SETTINGS_TABLE)?;

            let mut counters = write_txn.open_table(COUNTERS_TABLE)?;
            if counters.get(ORDER_SEQ_KEY)?.is_none() {
                counters.insert(ORDER_SEQ_KEY, 0u64)?;
            }
            if counters.get(LEDGER_SEQ_KEY)?.is_none() {
                counters.insert(LEDGER_SEQ_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Begin a write transaction (blocks until the single writer slot frees)
    pub fn begin_write(&self) -> StoreResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Counters ==========

    /// Increment and return the order id counter (within transaction)
    pub fn next_order_id(&self, txn: &WriteTransaction) -> StoreResult<u64> {
        self.next_counter(txn, ORDER_SEQ_KEY)
    }

    /// Increment and return the ledger entry id counter (within transaction)
    pub fn next_ledger_id(&self, txn: &WriteTransaction) -> StoreResult<u64> {
        self.next_counter(txn, LEDGER_SEQ_KEY)
    }

    fn next_counter(&self, txn: &WriteTransaction, key: &str) -> StoreResult<u64> {
        let mut table = txn.open_table(COUNTERS_TABLE)?;
        let current = table.get(key)?.map(|g| g.value()).unwrap_or(0);
        let next = current + 1;
        table.insert(key, next)?;
        Ok(next)
    }

    // ========== Orders ==========

    /// Store an order projection, maintaining the pending index
    pub fn put_order(&self, txn: &WriteTransaction, order: &Order) -> StoreResult<()> {
        {
            let mut table = txn.open_table(ORDERS_TABLE)?;
            let value = serde_json::to_vec(order)?;
            table.insert(order.id, value.as_slice())?;
        }
        let mut pending = txn.open_table(PENDING_ORDERS_TABLE)?;
        if order.status == OrderStatus::Pending {
            pending.insert(order.id, ())?;
        } else {
            pending.remove(order.id)?;
        }
        Ok(())
    }

    /// Get an order within a write transaction (sees uncommitted writes)
    pub fn get_order_txn(&self, txn: &WriteTransaction, id: u64) -> StoreResult<Option<Order>> {
        let table = txn.open_table(ORDERS_TABLE)?;
        match table.get(id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Get an order (read-only)
    pub fn get_order(&self, id: u64) -> StoreResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        match table.get(id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// All pending orders, newest first
    pub fn list_pending_orders(&self) -> StoreResult<Vec<Order>> {
        let read_txn = self.db.begin_read()?;
        let pending = read_txn.open_table(PENDING_ORDERS_TABLE)?;
        let orders = read_txn.open_table(ORDERS_TABLE)?;

        let mut result = Vec::new();
        for entry in pending.iter()? {
            let (key, _) = entry?;
            if let Some(guard) = orders.get(key.value())? {
                result.push(serde_json::from_slice::<Order>(guard.value())?);
            }
        }
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    /// Orders matching a predicate, newest first
    pub fn list_orders_where<F>(&self, mut pred: F) -> StoreResult<Vec<Order>>
    where
        F: FnMut(&Order) -> bool,
    {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;

        let mut result = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let order: Order = serde_json::from_slice(value.value())?;
            if pred(&order) {
                result.push(order);
            }
        }
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    // ========== Status History ==========

    /// Next history sequence for an order (within transaction)
    pub fn next_history_seq(&self, txn: &WriteTransaction, order_id: u64) -> StoreResult<u64> {
        let table = txn.open_table(STATUS_HISTORY_TABLE)?;
        let mut max_seq = 0;
        for entry in table.range((order_id, 0u64)..=(order_id, u64::MAX))? {
            let (key, _) = entry?;
            max_seq = max_seq.max(key.value().1);
        }
        Ok(max_seq + 1)
    }

    /// Append a status history record (append-only, never rewritten)
    pub fn append_history(
        &self,
        txn: &WriteTransaction,
        record: &StatusHistoryRecord,
    ) -> StoreResult<()> {
        let mut table = txn.open_table(STATUS_HISTORY_TABLE)?;
        let value = serde_json::to_vec(record)?;
        table.insert((record.order_id, record.seq), value.as_slice())?;
        Ok(())
    }

    /// Full transition history for an order, in sequence order
    pub fn history_for_order(&self, order_id: u64) -> StoreResult<Vec<StatusHistoryRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(STATUS_HISTORY_TABLE)?;

        let mut records = Vec::new();
        for entry in table.range((order_id, 0u64)..=(order_id, u64::MAX))? {
            let (_, value) = entry?;
            records.push(serde_json::from_slice::<StatusHistoryRecord>(value.value())?);
        }
        records.sort_by_key(|r| r.seq);
        Ok(records)
    }

    // ========== Wallets and Ledger ==========

    /// Get a wallet within a write transaction
    pub fn get_wallet_txn(
        &self,
        txn: &WriteTransaction,
        driver_id: i64,
    ) -> StoreResult<Option<shared::types::WalletAccount>> {
        let table = txn.open_table(WALLETS_TABLE)?;
        match table.get(driver_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Get a wallet (read-only)
    pub fn get_wallet(&self, driver_id: i64) -> StoreResult<Option<shared::types::WalletAccount>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS_TABLE)?;
        match table.get(driver_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Store a wallet projection
    pub fn put_wallet(
        &self,
        txn: &WriteTransaction,
        wallet: &shared::types::WalletAccount,
    ) -> StoreResult<()> {
        let mut table = txn.open_table(WALLETS_TABLE)?;
        let value = serde_json::to_vec(wallet)?;
        table.insert(wallet.driver_id, value.as_slice())?;
        Ok(())
    }

    /// Append a ledger entry and its per-driver index row
    pub fn append_ledger_entry(
        &self,
        txn: &WriteTransaction,
        entry: &LedgerEntry,
    ) -> StoreResult<()> {
        {
            let mut table = txn.open_table(LEDGER_TABLE)?;
            let value = serde_json::to_vec(entry)?;
            table.insert(entry.id, value.as_slice())?;
        }
        let mut index = txn.open_table(LEDGER_BY_DRIVER_TABLE)?;
        index.insert((entry.driver_id, entry.id), ())?;
        Ok(())
    }

    /// Ledger entries for one driver, newest first
    pub fn ledger_for_driver(&self, driver_id: i64, limit: usize) -> StoreResult<Vec<LedgerEntry>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(LEDGER_BY_DRIVER_TABLE)?;
        let ledger = read_txn.open_table(LEDGER_TABLE)?;

        let mut entries = Vec::new();
        for row in index.range((driver_id, 0u64)..=(driver_id, u64::MAX))? {
            let (key, _) = row?;
            if let Some(guard) = ledger.get(key.value().1)? {
                entries.push(serde_json::from_slice::<LedgerEntry>(guard.value())?);
            }
        }
        entries.sort_by(|a, b| b.id.cmp(&a.id));
        entries.truncate(limit);
        Ok(entries)
    }

    /// Fold over every ledger entry (dashboard aggregates)
    pub fn fold_ledger<A, F>(&self, init: A, mut f: F) -> StoreResult<A>
    where
        F: FnMut(A, &LedgerEntry) -> A,
    {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LEDGER_TABLE)?;

        let mut acc = init;
        for entry in table.iter()? {
            let (_, value) = entry?;
            let entry: LedgerEntry = serde_json::from_slice(value.value())?;
            acc = f(acc, &entry);
        }
        Ok(acc)
    }

    // ========== Users ==========

    pub fn get_user(&self, id: i64) -> StoreResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS_TABLE)?;
        match table.get(id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn put_user(&self, txn: &WriteTransaction, user: &User) -> StoreResult<()> {
        let mut table = txn.open_table(USERS_TABLE)?;
        let value = serde_json::to_vec(user)?;
        table.insert(user.id, value.as_slice())?;
        Ok(())
    }

    pub fn list_users(&self) -> StoreResult<Vec<User>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS_TABLE)?;

        let mut users = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            users.push(serde_json::from_slice::<User>(value.value())?);
        }
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    // ========== Ratings ==========

    pub fn get_rating(&self, order_id: u64) -> StoreResult<Option<Rating>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RATINGS_TABLE)?;
        match table.get(order_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_rating_txn(&self, txn: &WriteTransaction, order_id: u64) -> StoreResult<Option<Rating>> {
        let table = txn.open_table(RATINGS_TABLE)?;
        match table.get(order_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn put_rating(&self, txn: &WriteTransaction, rating: &Rating) -> StoreResult<()> {
        let mut table = txn.open_table(RATINGS_TABLE)?;
        let value = serde_json::to_vec(rating)?;
        table.insert(rating.order_id, value.as_slice())?;
        Ok(())
    }

    pub fn list_ratings_where<F>(&self, mut pred: F) -> StoreResult<Vec<Rating>>
    where
        F: FnMut(&Rating) -> bool,
    {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RATINGS_TABLE)?;

        let mut ratings = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let rating: Rating = serde_json::from_slice(value.value())?;
            if pred(&rating) {
                ratings.push(rating);
            }
        }
        ratings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(ratings)
    }

    // ========== Settings ==========

    /// Current platform settings; falls back to the given defaults when
    /// nothing has been persisted yet
    pub fn get_settings(&self, defaults: &PlatformSettings) -> StoreResult<PlatformSettings> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SETTINGS_TABLE)?;
        match table.get(PLATFORM_SETTINGS_KEY)? {
            Some(guard) => Ok(serde_json::from_slice(guard.value())?),
            None => Ok(defaults.clone()),
        }
    }

    /// Settings within a write transaction (order creation snapshot)
    pub fn get_settings_txn(
        &self,
        txn: &WriteTransaction,
        defaults: &PlatformSettings,
    ) -> StoreResult<PlatformSettings> {
        let table = txn.open_table(SETTINGS_TABLE)?;
        match table.get(PLATFORM_SETTINGS_KEY)? {
            Some(guard) => Ok(serde_json::from_slice(guard.value())?),
            None => Ok(defaults.clone()),
        }
    }

    pub fn put_settings(
        &self,
        txn: &WriteTransaction,
        settings: &PlatformSettings,
    ) -> StoreResult<()> {
        let mut table = txn.open_table(SETTINGS_TABLE)?;
        let value = serde_json::to_vec(settings)?;
        table.insert(PLATFORM_SETTINGS_KEY, value.as_slice())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::{GeoPoint, OrderType, WalletAccount};
    use shared::util::now_millis;

    fn sample_order(store: &Store) -> Order {
        let txn = store.begin_write().unwrap();
        let id = store.next_order_id(&txn).unwrap();
        let order = Order {
            id,
            order_type: OrderType::Taxi,
            status: OrderStatus::Pending,
            customer_id: 10,
            driver_id: None,
            pickup: GeoPoint {
                latitude: 33.31,
                longitude: 44.36,
            },
            dropoff: GeoPoint {
                latitude: 33.33,
                longitude: 44.43,
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
        };
        store.put_order(&txn, &order).unwrap();
        txn.commit().unwrap();
        order
    }

    #[test]
    fn order_ids_are_monotonic() {
        let store = Store::open_in_memory().unwrap();
        let a = sample_order(&store);
        let b = sample_order(&store);
        assert!(b.id > a.id);
    }

    #[test]
    fn pending_index_follows_status() {
        let store = Store::open_in_memory().unwrap();
        let mut order = sample_order(&store);
        assert_eq!(store.list_pending_orders().unwrap().len(), 1);

        order.status = OrderStatus::Accepted;
        order.driver_id = Some(20);
        let txn = store.begin_write().unwrap();
        store.put_order(&txn, &order).unwrap();
        txn.commit().unwrap();

        assert!(store.list_pending_orders().unwrap().is_empty());
    }

    #[test]
    fn ledger_index_scopes_by_driver() {
        let store = Store::open_in_memory().unwrap();
        let txn = store.begin_write().unwrap();
        for (driver, delta) in [(1i64, 100i64), (2, 200), (1, -50)] {
            let id = store.next_ledger_id(&txn).unwrap();
            let entry = LedgerEntry {
                id,
                driver_id: driver,
                order_id: None,
                delta,
                balance_after: delta,
                reason: shared::types::LedgerReason::Adjustment,
                description: None,
                created_at: now_millis(),
            };
            store.append_ledger_entry(&txn, &entry).unwrap();
        }
        txn.commit().unwrap();

        assert_eq!(store.ledger_for_driver(1, 50).unwrap().len(), 2);
        assert_eq!(store.ledger_for_driver(2, 50).unwrap().len(), 1);
        assert!(store.ledger_for_driver(3, 50).unwrap().is_empty());
    }

    #[test]
    fn settings_fall_back_to_defaults() {
        let store = Store::open_in_memory().unwrap();
        let defaults = PlatformSettings {
            commission_amount: 5000,
            min_wallet_floor: 0,
            updated_at: 0,
        };
        let settings = store.get_settings(&defaults).unwrap();
        assert_eq!(settings.commission_amount, 5000);

        let txn = store.begin_write().unwrap();
        store
            .put_settings(
                &txn,
                &PlatformSettings {
                    commission_amount: 6000,
                    min_wallet_floor: -1000,
                    updated_at: now_millis(),
                },
            )
            .unwrap();
        txn.commit().unwrap();

        let settings = store.get_settings(&defaults).unwrap();
        assert_eq!(settings.commission_amount, 6000);
        assert_eq!(settings.min_wallet_floor, -1000);
    }

    #[test]
    fn wallet_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let txn = store.begin_write().unwrap();
        store
            .put_wallet(
                &txn,
                &WalletAccount {
                    driver_id: 7,
                    balance: 12_000,
                    is_active: true,
                    updated_at: now_millis(),
                },
            )
            .unwrap();
        txn.commit().unwrap();

        let wallet = store.get_wallet(7).unwrap().unwrap();
        assert_eq!(wallet.balance, 12_000);
        assert!(store.get_wallet(8).unwrap().is_none());
    }
}
