//! The read-only balance contract.

use crate::LedgerError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tally_types::{AccountId, Timestamp, TokenAmount};

/// Source of truth for account balances.
///
/// Reads are synchronous at this boundary. An asynchronous ledger must be
/// adapted to block here, since the weight resolver holds a read lock on the
/// delegation index while it reads.
pub trait BalanceLedger: Send + Sync {
    /// Current balance of `account`. Unknown accounts hold zero.
    fn balance_of(&self, account: &AccountId) -> Result<TokenAmount, LedgerError>;

    /// Balances for a batch of accounts, in the order given.
    ///
    /// The first failing read aborts the batch.
    fn balances_of(&self, accounts: &[AccountId]) -> Result<Vec<TokenAmount>, LedgerError> {
        accounts.iter().map(|a| self.balance_of(a)).collect()
    }

    /// Saturating sum of the balances of `accounts`.
    fn total_balance_of<'a, I>(&self, accounts: I) -> Result<TokenAmount, LedgerError>
    where
        I: IntoIterator<Item = &'a AccountId>,
        Self: Sized,
    {
        let mut total = TokenAmount::ZERO;
        for account in accounts {
            total = total.saturating_add(self.balance_of(account)?);
        }
        Ok(total)
    }
}

impl<L: BalanceLedger + ?Sized> BalanceLedger for Arc<L> {
    fn balance_of(&self, account: &AccountId) -> Result<TokenAmount, LedgerError> {
        (**self).balance_of(account)
    }
}

/// Notification a ledger emits when an account's balance moves.
///
/// The governance core recomputes weights on demand, so it does not need to
/// consume these; they exist for collaborators that mirror balances.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub account: AccountId,
    pub previous: TokenAmount,
    pub current: TokenAmount,
    pub at: Timestamp,
}

impl BalanceChange {
    pub fn is_increase(&self) -> bool {
        self.current > self.previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapLedger(HashMap<AccountId, TokenAmount>);

    impl BalanceLedger for MapLedger {
        fn balance_of(&self, account: &AccountId) -> Result<TokenAmount, LedgerError> {
            Ok(self.0.get(account).copied().unwrap_or_default())
        }
    }

    struct DownLedger;

    impl BalanceLedger for DownLedger {
        fn balance_of(&self, _account: &AccountId) -> Result<TokenAmount, LedgerError> {
            Err(LedgerError::Unavailable("offline".into()))
        }
    }

    fn account(seed: u8) -> AccountId {
        AccountId::new([seed; 20])
    }

    #[test]
    fn batch_reads_preserve_order() {
        let ledger = MapLedger(HashMap::from([
            (account(1), TokenAmount::new(10)),
            (account(2), TokenAmount::new(20)),
        ]));
        let balances = ledger
            .balances_of(&[account(2), account(3), account(1)])
            .unwrap();
        assert_eq!(
            balances,
            vec![TokenAmount::new(20), TokenAmount::ZERO, TokenAmount::new(10)]
        );
    }

    #[test]
    fn total_sums_balances() {
        let ledger = MapLedger(HashMap::from([
            (account(1), TokenAmount::new(10)),
            (account(2), TokenAmount::new(20)),
        ]));
        let total = ledger.total_balance_of(&[account(1), account(2)]).unwrap();
        assert_eq!(total, TokenAmount::new(30));
    }

    #[test]
    fn unavailable_ledger_fails_batch() {
        let err = DownLedger.balances_of(&[account(1)]).unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(_)));
    }

    #[test]
    fn arc_ledger_delegates() {
        let ledger: Arc<dyn BalanceLedger> = Arc::new(MapLedger(HashMap::from([(
            account(7),
            TokenAmount::new(7),
        )])));
        assert_eq!(ledger.balance_of(&account(7)).unwrap(), TokenAmount::new(7));
    }
}
