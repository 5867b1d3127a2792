//! Nullable balance ledger: thread-safe in-memory balances for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use tally_ledger::{BalanceChange, BalanceLedger, LedgerError};
use tally_types::{AccountId, Timestamp, TokenAmount};

/// An in-memory balance ledger.
///
/// Every mutation is recorded as a [`BalanceChange`]. Reads can be made to
/// fail with [`LedgerError::Unavailable`] to exercise error paths.
#[derive(Default)]
pub struct NullLedger {
    balances: RwLock<HashMap<AccountId, TokenAmount>>,
    changes: Mutex<Vec<BalanceChange>>,
    unavailable: AtomicBool,
    reads: AtomicU64,
}

impl NullLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger pre-loaded with `balances`. No changes are recorded.
    pub fn with_balances<I>(balances: I) -> Self
    where
        I: IntoIterator<Item = (AccountId, u128)>,
    {
        let map = balances
            .into_iter()
            .map(|(account, raw)| (account, TokenAmount::new(raw)))
            .collect();
        Self {
            balances: RwLock::new(map),
            ..Self::default()
        }
    }

    /// Overwrite an account's balance.
    pub fn set_balance(&self, account: AccountId, amount: u128, at: Timestamp) {
        let mut balances = self.balances.write().unwrap_or_else(PoisonError::into_inner);
        let current = TokenAmount::new(amount);
        let previous = balances.insert(account, current).unwrap_or_default();
        self.record(BalanceChange {
            account,
            previous,
            current,
            at,
        });
    }

    /// Credit `amount` to `account`, saturating at the maximum.
    pub fn mint(&self, account: AccountId, amount: u128, at: Timestamp) {
        let mut balances = self.balances.write().unwrap_or_else(PoisonError::into_inner);
        let entry = balances.entry(account).or_default();
        let previous = *entry;
        *entry = previous.saturating_add(TokenAmount::new(amount));
        let current = *entry;
        self.record(BalanceChange {
            account,
            previous,
            current,
            at,
        });
    }

    /// Move `amount` from `from` to `to` atomically.
    pub fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: u128,
        at: Timestamp,
    ) -> Result<(), LedgerError> {
        let amount = TokenAmount::new(amount);
        let mut balances = self.balances.write().unwrap_or_else(PoisonError::into_inner);
        let from_before = balances.get(&from).copied().unwrap_or_default();
        let from_after =
            from_before
                .checked_sub(amount)
                .ok_or_else(|| LedgerError::InsufficientBalance {
                    account: from.to_string(),
                    have: from_before.raw(),
                    need: amount.raw(),
                })?;
        balances.insert(from, from_after);
        let to_before = balances.get(&to).copied().unwrap_or_default();
        let to_after = to_before.saturating_add(amount);
        balances.insert(to, to_after);

        let mut changes = self.changes();
        changes.push(BalanceChange {
            account: from,
            previous: from_before,
            current: from_after,
            at,
        });
        changes.push(BalanceChange {
            account: to,
            previous: to_before,
            current: to_after,
            at,
        });
        Ok(())
    }

    /// Make every subsequent read fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `balance_of` calls served so far, including failed ones.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// All balance movements, oldest first.
    pub fn balance_changes(&self) -> Vec<BalanceChange> {
        self.changes().clone()
    }

    fn changes(&self) -> MutexGuard<'_, Vec<BalanceChange>> {
        self.changes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, change: BalanceChange) {
        self.changes().push(change);
    }
}

impl BalanceLedger for NullLedger {
    fn balance_of(&self, account: &AccountId) -> Result<TokenAmount, LedgerError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("null ledger switched off".into()));
        }
        Ok(self
            .balances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(account)
            .copied()
            .unwrap_or_default())
    }
}
