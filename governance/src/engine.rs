//! Core governance engine: the single entry point for collaborators.
//!
//! The engine reads the clock once per operation and threads that instant
//! through every check, so one call never straddles two moments in time.

use crate::config::GovernanceConfig;
use crate::delegation::{DelegationChange, DelegationRegistry};
use crate::error::GovernanceError;
use crate::events::EventLog;
use crate::proposal::{Outcome, Proposal, ProposalId, ProposalStatus, VoteReceipt};
use crate::store::ProposalStore;
use crate::weight::{VoteWeightResolver, WeightSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tally_ledger::BalanceLedger;
use tally_types::{AccountId, Clock, Timestamp, TokenAmount};
use tally_utils::{format_duration, StatsCounter};
use tracing::{debug, info};

const COUNTERS: &[&str] = &[
    "proposals_created",
    "votes_cast",
    "votes_rejected",
    "delegations_changed",
    "proposals_executed",
];

/// Aggregate counts across every proposal, at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GovernanceStats {
    pub total: u64,
    pub pending: u64,
    pub active: u64,
    pub closed: u64,
    pub executed: u64,
    /// Vote records across all proposals.
    pub votes_cast: u64,
}

/// Serialized registry and proposal store, produced by
/// [`GovernanceEngine::save_state`].
#[derive(Serialize, Deserialize)]
struct EngineSnapshot {
    delegations: Vec<u8>,
    proposals: Vec<u8>,
}

/// Orchestrates proposals, votes and delegation over owned stores.
///
/// Votes and execution only go through the engine; the proposal store does
/// not expose its mutators, so no caller can record a weight the engine did
/// not compute.
///
/// ```compile_fail
/// # use tally_governance::GovernanceEngine;
/// # fn bypass(engine: &GovernanceEngine) {
/// let _ = engine.store();
/// # }
/// ```
pub struct GovernanceEngine {
    config: GovernanceConfig,
    clock: Arc<dyn Clock>,
    registry: Arc<DelegationRegistry>,
    resolver: VoteWeightResolver,
    store: ProposalStore,
    events: Arc<EventLog>,
    counters: StatsCounter,
}

impl GovernanceEngine {
    /// Build an engine with fresh, empty stores.
    pub fn new(
        config: GovernanceConfig,
        ledger: Arc<dyn BalanceLedger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GovernanceError> {
        let events = Arc::new(EventLog::new());
        let registry = Arc::new(DelegationRegistry::new(events.clone()));
        let store = ProposalStore::new(events.clone());
        Self::from_parts(config, ledger, clock, registry, store, events)
    }

    /// Build an engine over existing stores, which must emit into `events`.
    fn from_parts(
        config: GovernanceConfig,
        ledger: Arc<dyn BalanceLedger>,
        clock: Arc<dyn Clock>,
        registry: Arc<DelegationRegistry>,
        store: ProposalStore,
        events: Arc<EventLog>,
    ) -> Result<Self, GovernanceError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            resolver: VoteWeightResolver::new(ledger, registry.clone()),
            registry,
            store,
            events,
            counters: StatsCounter::new(COUNTERS),
        })
    }

    // ── Proposals ───────────────────────────────────────────────────────

    /// Open a proposal for `voting_period` seconds starting now.
    ///
    /// With a non-zero `proposal_threshold`, the proposer's effective weight
    /// must reach it.
    pub fn create_proposal(
        &self,
        proposer: AccountId,
        title: &str,
        description: &str,
        voting_period: u64,
    ) -> Result<ProposalId, GovernanceError> {
        let now = self.clock.now();
        if proposer.is_zero() {
            return Err(GovernanceError::InvalidAccount(proposer.to_string()));
        }
        if title.trim().is_empty() {
            return Err(GovernanceError::EmptyTitle);
        }
        if !self.config.accepts_period(voting_period) {
            debug!(%proposer, voting_period, "rejected voting period outside policy bounds");
            return Err(GovernanceError::InvalidPeriod(voting_period));
        }
        if self.config.proposal_threshold > 0 {
            let need = TokenAmount::new(u128::from(self.config.proposal_threshold));
            let have = self.resolver.effective_weight(&proposer, now)?;
            if have < need {
                debug!(%proposer, %have, %need, "proposer below threshold");
                return Err(GovernanceError::InsufficientPower {
                    have: have.raw(),
                    need: need.raw(),
                });
            }
        }

        let id = self
            .store
            .create(proposer, title, description, voting_period, now)?;
        self.counters.increment("proposals_created");
        info!(
            proposal = %id,
            %proposer,
            title,
            window = %format_duration(voting_period),
            "proposal created"
        );
        Ok(id)
    }

    /// Cast `voter`'s vote with its effective weight as of now.
    ///
    /// The weight is computed exactly once and recorded with the vote; later
    /// balance or delegation changes never touch it. A failed ledger read
    /// leaves the proposal untouched.
    pub fn vote(
        &self,
        voter: AccountId,
        id: ProposalId,
        support: bool,
    ) -> Result<VoteReceipt, GovernanceError> {
        let now = self.clock.now();
        let result = self.try_vote(voter, id, support, now);
        match &result {
            Ok(receipt) => {
                self.counters.increment("votes_cast");
                info!(proposal = %id, %voter, support, weight = %receipt.weight, "vote cast");
            }
            Err(e) => {
                self.counters.increment("votes_rejected");
                debug!(proposal = %id, %voter, error = %e, "vote rejected");
            }
        }
        result
    }

    fn try_vote(
        &self,
        voter: AccountId,
        id: ProposalId,
        support: bool,
        now: Timestamp,
    ) -> Result<VoteReceipt, GovernanceError> {
        // Pre-check so an unknown id, a zero voter, a closed proposal or a
        // repeat voter is reported as such rather than as a weight problem.
        // `record_vote` re-checks under the proposal lock.
        self.store.ensure_can_vote(id, &voter, now)?;

        let weight = self.resolver.effective_weight(&voter, now)?;
        if weight.is_zero() {
            return Err(GovernanceError::ZeroWeight(voter.to_string()));
        }
        self.store.record_vote(id, voter, support, weight, now)
    }

    /// Verdict of a closed proposal.
    pub fn outcome(&self, id: ProposalId) -> Result<Outcome, GovernanceError> {
        let now = self.clock.now();
        self.store.inspect(id, |p| {
            if p.is_closed(now) {
                Ok(p.tally_outcome())
            } else {
                Err(GovernanceError::NotClosed(id))
            }
        })?
    }

    /// Mark a closed, passing proposal as executed.
    ///
    /// Subscribers to the event log receive `ProposalExecuted` and carry out
    /// whatever the proposal asked for.
    pub fn execute(&self, id: ProposalId) -> Result<Proposal, GovernanceError> {
        let now = self.clock.now();
        let proposal = self.store.mark_executed_if(id, now, |p| {
            match p.tally_outcome() {
                Outcome::Passed => Ok(()),
                Outcome::Rejected => Err(GovernanceError::NotPassed(p.id)),
            }
        })?;
        self.counters.increment("proposals_executed");
        info!(
            proposal = %id,
            for_votes = %proposal.for_votes,
            against_votes = %proposal.against_votes,
            "proposal executed"
        );
        Ok(proposal)
    }

    // ── Delegation ──────────────────────────────────────────────────────

    /// Point `delegator`'s balance at `delegatee` (or back at itself).
    pub fn delegate(
        &self,
        delegator: AccountId,
        delegatee: AccountId,
    ) -> Result<DelegationChange, GovernanceError> {
        let change = self.registry.delegate(delegator, delegatee)?;
        self.counters.increment("delegations_changed");
        Ok(change)
    }

    pub fn undelegate(&self, delegator: AccountId) -> Result<DelegationChange, GovernanceError> {
        self.delegate(delegator, delegator)
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn get_proposal(&self, id: ProposalId) -> Result<Proposal, GovernanceError> {
        self.store.get(id)
    }

    pub fn get_proposal_count(&self) -> u64 {
        self.store.count()
    }

    /// Effective voting power of `account` right now.
    pub fn get_votes(&self, account: &AccountId) -> Result<TokenAmount, GovernanceError> {
        self.resolver.effective_weight(account, self.clock.now())
    }

    /// Breakdown behind [`get_votes`](Self::get_votes).
    pub fn weight_breakdown(&self, account: &AccountId) -> Result<WeightSnapshot, GovernanceError> {
        self.resolver.resolve(account, self.clock.now())
    }

    /// Current delegatee of `account` (itself when none is set).
    pub fn delegates(&self, account: &AccountId) -> AccountId {
        self.registry.delegatee_of(account)
    }

    pub fn status(&self, id: ProposalId) -> Result<ProposalStatus, GovernanceError> {
        let now = self.clock.now();
        self.store.inspect(id, |p| p.status(now))
    }

    pub fn receipt(
        &self,
        id: ProposalId,
        voter: &AccountId,
    ) -> Result<Option<VoteReceipt>, GovernanceError> {
        self.store.receipt(id, voter)
    }

    pub fn has_voted(&self, id: ProposalId, voter: &AccountId) -> Result<bool, GovernanceError> {
        Ok(self.receipt(id, voter)?.is_some())
    }

    /// Proposals in id order, optionally only those in `status` right now.
    pub fn proposals(&self, status: Option<ProposalStatus>) -> Vec<Proposal> {
        self.store.proposals(status, self.clock.now())
    }

    /// Closed, unexecuted proposals with their verdicts, for collaborators
    /// that resolve eagerly once windows elapse.
    pub fn pending_resolution(&self) -> Vec<(ProposalId, Outcome)> {
        self.proposals(Some(ProposalStatus::Closed))
            .iter()
            .map(|p| (p.id, p.tally_outcome()))
            .collect()
    }

    pub fn stats(&self) -> GovernanceStats {
        let now = self.clock.now();
        self.store
            .proposals(None, now)
            .iter()
            .fold(GovernanceStats::default(), |mut stats, p| {
                stats.total += 1;
                stats.votes_cast += p.vote_count() as u64;
                match p.status(now) {
                    ProposalStatus::Pending => stats.pending += 1,
                    ProposalStatus::Active => stats.active += 1,
                    ProposalStatus::Closed => stats.closed += 1,
                    ProposalStatus::Executed => stats.executed += 1,
                }
                stats
            })
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn registry(&self) -> &Arc<DelegationRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    /// Operation counters: created, cast, rejected, delegated, executed.
    pub fn counters(&self) -> &StatsCounter {
        &self.counters
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    /// Serialize delegations and proposals, receipts included.
    pub fn save_state(&self) -> Result<Vec<u8>, GovernanceError> {
        let snapshot = EngineSnapshot {
            delegations: self.registry.save_state()?,
            proposals: self.store.save_state()?,
        };
        bincode::serialize(&snapshot).map_err(|e| GovernanceError::Snapshot(e.to_string()))
    }

    /// Rebuild an engine from [`save_state`](Self::save_state) bytes.
    ///
    /// The event log starts empty.
    pub fn load_state(
        config: GovernanceConfig,
        ledger: Arc<dyn BalanceLedger>,
        clock: Arc<dyn Clock>,
        data: &[u8],
    ) -> Result<Self, GovernanceError> {
        let snapshot: EngineSnapshot =
            bincode::deserialize(data).map_err(|e| GovernanceError::Snapshot(e.to_string()))?;
        let events = Arc::new(EventLog::new());
        let registry = Arc::new(DelegationRegistry::load_state(
            &snapshot.delegations,
            events.clone(),
        )?);
        let store = ProposalStore::load_state(&snapshot.proposals, events.clone())?;
        let engine = Self::from_parts(config, ledger, clock, registry, store, events)?;
        info!(
            proposals = engine.get_proposal_count(),
            delegations = engine.registry.delegation_count(),
            "governance state restored"
        );
        Ok(engine)
    }
}
