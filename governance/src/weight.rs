//! Effective voting power.
//!
//! `power(A) = balance(A) + Σ balance(X) for every X with delegatee_of(X) == A`
//!
//! One hop only. The sum is computed on demand and never cached; a vote
//! captures its own copy of the result.

use crate::delegation::DelegationRegistry;
use crate::error::GovernanceError;
use std::sync::Arc;
use tally_ledger::BalanceLedger;
use tally_types::{AccountId, Timestamp, TokenAmount};
use tracing::{debug, warn};

/// Breakdown of one effective-weight computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeightSnapshot {
    pub account: AccountId,
    pub own_balance: TokenAmount,
    pub delegated_balance: TokenAmount,
    /// Number of accounts delegating to `account`.
    pub delegators: usize,
    /// Registry version the delegator set was read at.
    pub registry_version: u64,
    pub at: Timestamp,
}

impl WeightSnapshot {
    pub fn total(&self) -> TokenAmount {
        self.own_balance.saturating_add(self.delegated_balance)
    }
}

/// Combines ledger balances with the delegation registry.
pub struct VoteWeightResolver {
    ledger: Arc<dyn BalanceLedger>,
    registry: Arc<DelegationRegistry>,
}

impl VoteWeightResolver {
    pub fn new(ledger: Arc<dyn BalanceLedger>, registry: Arc<DelegationRegistry>) -> Self {
        Self { ledger, registry }
    }

    /// Effective voting power of `account` at `at`.
    pub fn effective_weight(
        &self,
        account: &AccountId,
        at: Timestamp,
    ) -> Result<TokenAmount, GovernanceError> {
        Ok(self.resolve(account, at)?.total())
    }

    /// Compute the full breakdown.
    ///
    /// The delegator set and every balance are read under the registry's
    /// read lock, so a concurrent `delegate` call is observed either wholly
    /// before or wholly after this computation. A failed ledger read aborts
    /// the whole computation.
    pub fn resolve(
        &self,
        account: &AccountId,
        at: Timestamp,
    ) -> Result<WeightSnapshot, GovernanceError> {
        let result = self.registry.with_delegators(account, |delegators, version| {
            let own_balance = self.ledger.balance_of(account)?;
            let delegated_balance = self.ledger.total_balance_of(delegators.iter())?;
            Ok::<_, tally_ledger::LedgerError>(WeightSnapshot {
                account: *account,
                own_balance,
                delegated_balance,
                delegators: delegators.len(),
                registry_version: version,
                at,
            })
        });

        match result {
            Ok(snapshot) => {
                debug!(
                    %account,
                    own = %snapshot.own_balance,
                    delegated = %snapshot.delegated_balance,
                    delegators = snapshot.delegators,
                    version = snapshot.registry_version,
                    "resolved voting weight"
                );
                Ok(snapshot)
            }
            Err(e) => {
                warn!(%account, error = %e, "balance read failed during weight resolution");
                Err(e.into())
            }
        }
    }

    pub fn registry(&self) -> &Arc<DelegationRegistry> {
        &self.registry
    }
}
