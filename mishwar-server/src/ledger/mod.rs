//! Wallet ledger
//!
//! The only writer of wallet and ledger tables. Every movement appends
//! exactly one `LedgerEntry` and updates the wallet projection in the same
//! write transaction; `balance_after` forms a causally ordered chain per
//! driver. Debits are gated by the configured floor (may be negative to
//! allow bounded overdraft) and by wallet activation state.
//!
//! Concurrent debits against one driver serialize on redb's single writer:
//! the second debit observes the first one's committed balance, never a
//! stale read.

use redb::WriteTransaction;
use shared::types::{LedgerEntry, LedgerReason, PlatformSettings, WalletAccount};
use shared::util::now_millis;
use thiserror::Error;

use crate::store::{Store, StoreError};

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: i64, required: i64 },

    #[error("Wallet is suspended: driver {0}")]
    WalletInactive(i64),

    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Wallet ledger service
#[derive(Clone)]
pub struct Ledger {
    store: Store,
    defaults: PlatformSettings,
}

impl Ledger {
    pub fn new(store: Store, defaults: PlatformSettings) -> Self {
        Self { store, defaults }
    }

    /// Debit `amount` from a driver's wallet for an order commission.
    ///
    /// Fails with `InsufficientFunds` when `balance - amount` would drop
    /// below the configured floor. Wallet update and ledger entry commit
    /// together or not at all.
    pub fn debit(&self, driver_id: i64, amount: i64, order_id: u64) -> LedgerResult<i64> {
        let txn = self.store.begin_write()?;
        let floor = self.store.get_settings_txn(&txn, &self.defaults)?.min_wallet_floor;
        let balance = self.debit_txn(&txn, driver_id, amount, order_id, floor)?;
        txn.commit().map_err(StoreError::from)?;
        Ok(balance)
    }

    /// Debit within a caller-owned transaction (order acceptance unit)
    pub fn debit_txn(
        &self,
        txn: &WriteTransaction,
        driver_id: i64,
        amount: i64,
        order_id: u64,
        floor: i64,
    ) -> LedgerResult<i64> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let wallet = self.get_or_create_wallet_txn(txn, driver_id)?;
        if !wallet.is_active {
            return Err(LedgerError::WalletInactive(driver_id));
        }
        if wallet.balance - amount < floor {
            return Err(LedgerError::InsufficientFunds {
                balance: wallet.balance,
                required: amount,
            });
        }

        let balance_after = wallet.balance - amount;
        self.apply_txn(
            txn,
            wallet,
            -amount,
            balance_after,
            LedgerReason::Commission,
            Some(order_id),
            Some(format!("Commission for order #{order_id}")),
        )?;
        Ok(balance_after)
    }

    /// Credit a driver's wallet (top-up, refund, adjustment).
    /// Always succeeds for non-negative amounts.
    pub fn credit(
        &self,
        driver_id: i64,
        amount: i64,
        reason: LedgerReason,
        order_id: Option<u64>,
        description: Option<String>,
    ) -> LedgerResult<i64> {
        let txn = self.store.begin_write()?;
        let balance = self.credit_txn(&txn, driver_id, amount, reason, order_id, description)?;
        txn.commit().map_err(StoreError::from)?;
        Ok(balance)
    }

    /// Credit within a caller-owned transaction (cancellation refund unit)
    pub fn credit_txn(
        &self,
        txn: &WriteTransaction,
        driver_id: i64,
        amount: i64,
        reason: LedgerReason,
        order_id: Option<u64>,
        description: Option<String>,
    ) -> LedgerResult<i64> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let wallet = self.get_or_create_wallet_txn(txn, driver_id)?;
        let balance_after = wallet.balance + amount;
        self.apply_txn(txn, wallet, amount, balance_after, reason, order_id, description)?;
        Ok(balance_after)
    }

    /// Current balance (zero for a never-seen driver)
    pub fn balance(&self, driver_id: i64) -> LedgerResult<i64> {
        Ok(self
            .store
            .get_wallet(driver_id)?
            .map(|w| w.balance)
            .unwrap_or(0))
    }

    /// Transaction history, newest first
    pub fn history(&self, driver_id: i64, limit: usize) -> LedgerResult<Vec<LedgerEntry>> {
        Ok(self.store.ledger_for_driver(driver_id, limit)?)
    }

    /// Whether the driver may accept orders: wallet active and balance at
    /// or above the floor
    pub fn can_accept_orders(&self, driver_id: i64) -> LedgerResult<bool> {
        let floor = self.store.get_settings(&self.defaults)?.min_wallet_floor;
        let wallet = self.store.get_wallet(driver_id)?;
        Ok(match wallet {
            Some(w) => w.is_active && w.balance >= floor,
            None => 0 >= floor,
        })
    }

    /// Suspend or reinstate a wallet. Suspension blocks new debits but
    /// preserves history; the account is never destroyed.
    pub fn set_wallet_active(&self, driver_id: i64, active: bool) -> LedgerResult<()> {
        let txn = self.store.begin_write()?;
        let mut wallet = self.get_or_create_wallet_txn(&txn, driver_id)?;
        wallet.is_active = active;
        wallet.updated_at = now_millis();
        self.store.put_wallet(&txn, &wallet)?;
        txn.commit().map_err(StoreError::from)?;
        Ok(())
    }

    fn get_or_create_wallet_txn(
        &self,
        txn: &WriteTransaction,
        driver_id: i64,
    ) -> LedgerResult<WalletAccount> {
        if let Some(wallet) = self.store.get_wallet_txn(txn, driver_id)? {
            return Ok(wallet);
        }
        let wallet = WalletAccount {
            driver_id,
            balance: 0,
            is_active: true,
            updated_at: now_millis(),
        };
        self.store.put_wallet(txn, &wallet)?;
        Ok(wallet)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_txn(
        &self,
        txn: &WriteTransaction,
        mut wallet: WalletAccount,
        delta: i64,
        balance_after: i64,
        reason: LedgerReason,
        order_id: Option<u64>,
        description: Option<String>,
    ) -> LedgerResult<()> {
        let id = self.store.next_ledger_id(txn)?;
        let entry = LedgerEntry {
            id,
            driver_id: wallet.driver_id,
            order_id,
            delta,
            balance_after,
            reason,
            description,
            created_at: now_millis(),
        };
        self.store.append_ledger_entry(txn, &entry)?;

        wallet.balance = balance_after;
        wallet.updated_at = entry.created_at;
        self.store.put_wallet(txn, &wallet)?;

        tracing::debug!(
            driver_id = wallet.driver_id,
            delta,
            balance_after,
            reason = ?reason,
            "Ledger entry committed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ledger() -> Ledger {
        let store = Store::open_in_memory().unwrap();
        let defaults = PlatformSettings {
            commission_amount: 5000,
            min_wallet_floor: 0,
            updated_at: 0,
        };
        Ledger::new(store, defaults)
    }

    #[test]
    fn debit_respects_floor() {
        let ledger = test_ledger();
        ledger
            .credit(1, 4000, LedgerReason::Topup, None, None)
            .unwrap();

        let err = ledger.debit(1, 5000, 99).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds {
                balance: 4000,
                required: 5000
            }
        ));
        // Nothing committed
        assert_eq!(ledger.balance(1).unwrap(), 4000);
        assert_eq!(ledger.history(1, 50).unwrap().len(), 1);
    }

    #[test]
    fn negative_floor_allows_bounded_overdraft() {
        let ledger = Ledger::new(
            Store::open_in_memory().unwrap(),
            PlatformSettings {
                commission_amount: 5000,
                min_wallet_floor: -5000,
                updated_at: 0,
            },
        );
        assert_eq!(ledger.debit(1, 5000, 1).unwrap(), -5000);
        assert!(matches!(
            ledger.debit(1, 1, 2).unwrap_err(),
            LedgerError::InsufficientFunds { .. }
        ));
    }

    #[test]
    fn balance_after_forms_a_chain() {
        let ledger = test_ledger();
        ledger
            .credit(9, 10_000, LedgerReason::Topup, None, None)
            .unwrap();
        ledger.debit(9, 5000, 1).unwrap();
        ledger.debit(9, 2000, 2).unwrap();
        ledger
            .credit(9, 2000, LedgerReason::Refund, Some(2), None)
            .unwrap();

        // Oldest first for chain verification
        let mut entries = ledger.history(9, 50).unwrap();
        entries.reverse();

        let mut expected = 0i64;
        for entry in &entries {
            expected += entry.delta;
            assert_eq!(entry.balance_after, expected);
        }
        assert_eq!(ledger.balance(9).unwrap(), expected);
        assert_eq!(expected, 5000);
    }

    #[test]
    fn concurrent_debits_never_lose_updates() {
        let ledger = test_ledger();
        ledger
            .credit(5, 100_000, LedgerReason::Topup, None, None)
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..10u64 {
            let ledger = ledger.clone();
            handles.push(std::thread::spawn(move || ledger.debit(5, 1000, i + 1)));
        }
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(ledger.balance(5).unwrap(), 90_000);

        // Every post-balance is distinct: no two debits saw the same pre-balance
        let debits: Vec<i64> = ledger
            .history(5, 50)
            .unwrap()
            .iter()
            .filter(|e| e.delta < 0)
            .map(|e| e.balance_after)
            .collect();
        let mut sorted = debits.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), debits.len());
    }

    #[test]
    fn suspended_wallet_blocks_debits_keeps_history() {
        let ledger = test_ledger();
        ledger
            .credit(3, 10_000, LedgerReason::Topup, None, None)
            .unwrap();
        ledger.set_wallet_active(3, false).unwrap();

        assert!(matches!(
            ledger.debit(3, 1000, 1).unwrap_err(),
            LedgerError::WalletInactive(3)
        ));
        assert!(!ledger.can_accept_orders(3).unwrap());
        assert_eq!(ledger.history(3, 50).unwrap().len(), 1);

        ledger.set_wallet_active(3, true).unwrap();
        assert!(ledger.can_accept_orders(3).unwrap());
    }

    #[test]
    fn credit_rejects_negative_amounts() {
        let ledger = test_ledger();
        assert!(matches!(
            ledger
                .credit(1, -5, LedgerReason::Topup, None, None)
                .unwrap_err(),
            LedgerError::InvalidAmount(-5)
        ));
    }
}
