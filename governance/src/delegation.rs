//! Vote delegation: entrust an account's balance to a single delegatee.
//!
//! Delegation is one hop only. If A delegates to B and B delegates to C,
//! C is credited with B's balance but not A's; A's balance stays with B.
//! Resolution never walks chains, so cycles are harmless and need no
//! detection.
//!
//! The registry keeps the forward map (delegator → delegatee) and a reverse
//! index (delegatee → delegators) behind one lock, so the two can never be
//! observed out of step.

use crate::error::GovernanceError;
use crate::events::{EventLog, GovernanceEvent};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tally_types::AccountId;
use tracing::{debug, info};

/// Result of a successful [`DelegationRegistry::delegate`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelegationChange {
    pub delegator: AccountId,
    /// Effective delegatee before the call.
    pub from: AccountId,
    /// Effective delegatee after the call.
    pub to: AccountId,
    /// Registry version after the call.
    pub version: u64,
}

#[derive(Default)]
struct DelegationGraph {
    /// Only non-self delegations are stored.
    delegations: BTreeMap<AccountId, AccountId>,
    /// Reverse index: delegatee → direct delegators.
    reverse_delegations: BTreeMap<AccountId, BTreeSet<AccountId>>,
    /// Bumped on every `delegate` call.
    version: u64,
}

impl DelegationGraph {
    fn unlink(&mut self, delegator: &AccountId) -> Option<AccountId> {
        let old_to = self.delegations.remove(delegator)?;
        if let Some(set) = self.reverse_delegations.get_mut(&old_to) {
            set.remove(delegator);
            if set.is_empty() {
                self.reverse_delegations.remove(&old_to);
            }
        }
        Some(old_to)
    }

    fn link(&mut self, delegator: AccountId, delegatee: AccountId) {
        self.delegations.insert(delegator, delegatee);
        self.reverse_delegations
            .entry(delegatee)
            .or_default()
            .insert(delegator);
    }
}

/// Tracks, for every account, the one account empowered to vote its balance.
pub struct DelegationRegistry {
    graph: RwLock<DelegationGraph>,
    events: Arc<EventLog>,
}

impl DelegationRegistry {
    pub fn new(events: Arc<EventLog>) -> Self {
        Self {
            graph: RwLock::new(DelegationGraph::default()),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, DelegationGraph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DelegationGraph> {
        self.graph.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Point `delegator`'s balance at `delegatee`.
    ///
    /// Delegating to oneself clears any delegation. The null account may be
    /// neither delegator nor delegatee. Emits `DelegateChanged` on every
    /// successful call, even when the delegatee is unchanged. Tallies already
    /// recorded on proposals are not touched.
    pub fn delegate(
        &self,
        delegator: AccountId,
        delegatee: AccountId,
    ) -> Result<DelegationChange, GovernanceError> {
        if delegator.is_zero() {
            return Err(GovernanceError::InvalidAccount(delegator.to_string()));
        }
        if delegatee.is_zero() {
            debug!(%delegator, "rejected delegation to the null account");
            return Err(GovernanceError::InvalidAccount(delegatee.to_string()));
        }

        let mut graph = self.write();
        let from = graph.unlink(&delegator).unwrap_or(delegator);
        if delegatee != delegator {
            graph.link(delegator, delegatee);
        }
        graph.version += 1;
        let change = DelegationChange {
            delegator,
            from,
            to: delegatee,
            version: graph.version,
        };

        // Emitted under the write lock so the event order matches the
        // mutation order for any one delegator.
        self.events.emit(GovernanceEvent::DelegateChanged {
            delegator,
            from,
            to: delegatee,
        });
        drop(graph);

        info!(%delegator, %from, to = %delegatee, version = change.version, "delegate changed");
        Ok(change)
    }

    /// Return `delegator`'s balance to itself.
    pub fn undelegate(&self, delegator: AccountId) -> Result<DelegationChange, GovernanceError> {
        self.delegate(delegator, delegator)
    }

    /// The account voting with `account`'s balance: the last delegatee set,
    /// or `account` itself.
    pub fn delegatee_of(&self, account: &AccountId) -> AccountId {
        self.read()
            .delegations
            .get(account)
            .copied()
            .unwrap_or(*account)
    }

    /// Accounts that directly delegated to `delegatee`, in ascending order.
    pub fn delegators_of(&self, delegatee: &AccountId) -> Vec<AccountId> {
        self.read()
            .reverse_delegations
            .get(delegatee)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Run `f` over `delegatee`'s delegator set and the registry version
    /// while holding the read lock, so no delegation can land mid-call.
    pub fn with_delegators<R>(
        &self,
        delegatee: &AccountId,
        f: impl FnOnce(&BTreeSet<AccountId>, u64) -> R,
    ) -> R {
        let graph = self.read();
        let empty = BTreeSet::new();
        let delegators = graph.reverse_delegations.get(delegatee).unwrap_or(&empty);
        f(delegators, graph.version)
    }

    /// All non-self delegations, ordered by delegator.
    pub fn delegations(&self) -> Vec<(AccountId, AccountId)> {
        self.read()
            .delegations
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect()
    }

    /// Number of accounts currently delegating elsewhere.
    pub fn delegation_count(&self) -> usize {
        self.read().delegations.len()
    }

    /// Monotonic change counter.
    pub fn version(&self) -> u64 {
        self.read().version
    }
}

/// Serializable snapshot of the registry's delegation graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DelegationSnapshot {
    pub delegations: BTreeMap<AccountId, AccountId>,
    pub version: u64,
}

impl DelegationRegistry {
    /// Serialize the delegation graph for a persistence collaborator.
    pub fn save_state(&self) -> Result<Vec<u8>, GovernanceError> {
        let graph = self.read();
        let snapshot = DelegationSnapshot {
            delegations: graph.delegations.clone(),
            version: graph.version,
        };
        bincode::serialize(&snapshot).map_err(|e| GovernanceError::Snapshot(e.to_string()))
    }

    /// Restore a registry from [`save_state`](Self::save_state) bytes,
    /// rebuilding the reverse index.
    pub fn load_state(data: &[u8], events: Arc<EventLog>) -> Result<Self, GovernanceError> {
        let snapshot: DelegationSnapshot =
            bincode::deserialize(data).map_err(|e| GovernanceError::Snapshot(e.to_string()))?;
        let mut graph = DelegationGraph {
            version: snapshot.version,
            ..DelegationGraph::default()
        };
        for (from, to) in snapshot.delegations {
            if from.is_zero() || to.is_zero() || from == to {
                return Err(GovernanceError::Snapshot(format!(
                    "invalid delegation edge {from} -> {to}"
                )));
            }
            graph.link(from, to);
        }
        Ok(Self {
            graph: RwLock::new(graph),
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(seed: u8) -> AccountId {
        AccountId::new([seed; 20])
    }

    fn registry() -> DelegationRegistry {
        DelegationRegistry::new(Arc::new(EventLog::new()))
    }

    #[test]
    fn no_delegation_resolves_to_self() {
        let registry = registry();
        assert_eq!(registry.delegatee_of(&account(1)), account(1));
        assert!(registry.delegators_of(&account(1)).is_empty());
    }

    #[test]
    fn simple_delegation() {
        let registry = registry();
        let change = registry.delegate(account(1), account(2)).unwrap();
        assert_eq!(change.from, account(1));
        assert_eq!(change.to, account(2));
        assert_eq!(registry.delegatee_of(&account(1)), account(2));
        assert_eq!(registry.delegators_of(&account(2)), vec![account(1)]);
    }

    #[test]
    fn redelegation_moves_reverse_entry() {
        let registry = registry();
        registry.delegate(account(1), account(2)).unwrap();
        let change = registry.delegate(account(1), account(3)).unwrap();
        assert_eq!(change.from, account(2));
        assert_eq!(registry.delegatee_of(&account(1)), account(3));
        assert!(registry.delegators_of(&account(2)).is_empty());
        assert_eq!(registry.delegators_of(&account(3)), vec![account(1)]);
    }

    #[test]
    fn self_delegation_resets() {
        let registry = registry();
        registry.delegate(account(1), account(2)).unwrap();
        let change = registry.delegate(account(1), account(1)).unwrap();
        assert_eq!(change.from, account(2));
        assert_eq!(change.to, account(1));
        assert_eq!(registry.delegatee_of(&account(1)), account(1));
        assert_eq!(registry.delegation_count(), 0);
        assert!(registry.delegators_of(&account(2)).is_empty());
    }

    #[test]
    fn undelegate_without_delegation_is_harmless() {
        let registry = registry();
        let change = registry.undelegate(account(5)).unwrap();
        assert_eq!(change.from, account(5));
        assert_eq!(change.to, account(5));
        assert_eq!(registry.version(), 1);
    }

    #[test]
    fn null_account_rejected() {
        let registry = registry();
        assert!(matches!(
            registry.delegate(account(1), AccountId::ZERO),
            Err(GovernanceError::InvalidAccount(_))
        ));
        assert!(matches!(
            registry.delegate(AccountId::ZERO, account(1)),
            Err(GovernanceError::InvalidAccount(_))
        ));
        assert_eq!(registry.version(), 0);
        assert_eq!(registry.delegatee_of(&account(1)), account(1));
    }

    #[test]
    fn chains_are_not_collapsed() {
        let registry = registry();
        registry.delegate(account(1), account(2)).unwrap();
        registry.delegate(account(2), account(3)).unwrap();
        assert_eq!(registry.delegatee_of(&account(1)), account(2));
        assert_eq!(registry.delegators_of(&account(3)), vec![account(2)]);
        assert_eq!(registry.delegators_of(&account(2)), vec![account(1)]);
    }

    #[test]
    fn cycles_are_stored_as_plain_edges() {
        let registry = registry();
        registry.delegate(account(1), account(2)).unwrap();
        registry.delegate(account(2), account(1)).unwrap();
        assert_eq!(registry.delegatee_of(&account(1)), account(2));
        assert_eq!(registry.delegatee_of(&account(2)), account(1));
    }

    #[test]
    fn every_call_emits_an_event() {
        let events = Arc::new(EventLog::new());
        let registry = DelegationRegistry::new(events.clone());
        registry.delegate(account(1), account(2)).unwrap();
        registry.delegate(account(1), account(2)).unwrap();
        registry.undelegate(account(1)).unwrap();
        let emitted: Vec<GovernanceEvent> = events.events().into_iter().map(|e| e.event).collect();
        assert_eq!(
            emitted,
            vec![
                GovernanceEvent::DelegateChanged {
                    delegator: account(1),
                    from: account(1),
                    to: account(2),
                },
                GovernanceEvent::DelegateChanged {
                    delegator: account(1),
                    from: account(2),
                    to: account(2),
                },
                GovernanceEvent::DelegateChanged {
                    delegator: account(1),
                    from: account(2),
                    to: account(1),
                },
            ]
        );
    }

    #[test]
    fn with_delegators_sees_version() {
        let registry = registry();
        registry.delegate(account(1), account(9)).unwrap();
        registry.delegate(account(2), account(9)).unwrap();
        let (count, version) = registry.with_delegators(&account(9), |d, v| (d.len(), v));
        assert_eq!(count, 2);
        assert_eq!(version, 2);
    }

    #[test]
    fn state_round_trips() {
        let registry = registry();
        registry.delegate(account(1), account(2)).unwrap();
        registry.delegate(account(3), account(2)).unwrap();
        let bytes = registry.save_state().unwrap();

        let restored = DelegationRegistry::load_state(&bytes, Arc::new(EventLog::new())).unwrap();
        assert_eq!(restored.delegations(), registry.delegations());
        assert_eq!(restored.delegators_of(&account(2)), vec![account(1), account(3)]);
        assert_eq!(restored.version(), 2);
    }

    #[test]
    fn corrupt_state_is_an_error() {
        let err = DelegationRegistry::load_state(&[0xff, 0x01], Arc::new(EventLog::new()));
        assert!(matches!(err, Err(GovernanceError::Snapshot(_))));
    }
}
