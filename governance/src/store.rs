//! Proposal storage.
//!
//! Proposals are append-only. Each one sits behind its own mutex, so vote
//! recording on one proposal never waits on another, and the voter check,
//! voter insert and tally increment happen in one critical section.

use crate::error::GovernanceError;
use crate::events::{EventLog, GovernanceEvent};
use crate::proposal::{Proposal, ProposalId, ProposalStatus, VoteReceipt};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tally_types::{AccountId, Timestamp, TokenAmount};
use tracing::debug;

type Slot = Arc<Mutex<Proposal>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Proposal> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn check_can_vote(
    proposal: &Proposal,
    voter: &AccountId,
    now: Timestamp,
) -> Result<(), GovernanceError> {
    if voter.is_zero() {
        return Err(GovernanceError::InvalidAccount(voter.to_string()));
    }
    if !proposal.is_active(now) {
        return Err(GovernanceError::NotActive(proposal.id));
    }
    if proposal.has_voted(voter) {
        return Err(GovernanceError::AlreadyVoted {
            proposal: proposal.id,
            voter: voter.to_string(),
        });
    }
    Ok(())
}

/// Owns every proposal ever created.
pub struct ProposalStore {
    proposals: RwLock<Vec<Slot>>,
    events: Arc<EventLog>,
}

impl ProposalStore {
    pub fn new(events: Arc<EventLog>) -> Self {
        Self {
            proposals: RwLock::new(Vec::new()),
            events,
        }
    }

    fn slot(&self, id: ProposalId) -> Result<Slot, GovernanceError> {
        let index = usize::try_from(id.raw())
            .ok()
            .and_then(|raw| raw.checked_sub(1))
            .ok_or(GovernanceError::NotFound(id))?;
        self.proposals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
            .ok_or(GovernanceError::NotFound(id))
    }

    fn slots(&self) -> Vec<Slot> {
        self.proposals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Create a proposal whose voting window is `[now, now + voting_period)`.
    ///
    /// All validation happens before anything is inserted. Proposer policy
    /// (period bounds, threshold) is the engine's job.
    pub(crate) fn create(
        &self,
        proposer: AccountId,
        title: &str,
        description: &str,
        voting_period: u64,
        now: Timestamp,
    ) -> Result<ProposalId, GovernanceError> {
        if proposer.is_zero() {
            return Err(GovernanceError::InvalidAccount(proposer.to_string()));
        }
        if title.trim().is_empty() {
            return Err(GovernanceError::EmptyTitle);
        }
        if voting_period == 0 {
            return Err(GovernanceError::InvalidPeriod(voting_period));
        }
        let end_time = now
            .checked_add_secs(voting_period)
            .ok_or(GovernanceError::InvalidPeriod(voting_period))?;

        let mut proposals = self.proposals.write().unwrap_or_else(PoisonError::into_inner);
        let id = ProposalId::new(proposals.len() as u64 + 1);
        proposals.push(Arc::new(Mutex::new(Proposal {
            id,
            title: title.to_string(),
            description: description.to_string(),
            proposer,
            start_time: now,
            end_time,
            for_votes: TokenAmount::ZERO,
            against_votes: TokenAmount::ZERO,
            executed: false,
            receipts: BTreeMap::new(),
        })));
        self.events.emit(GovernanceEvent::ProposalCreated {
            id,
            proposer,
            title: title.to_string(),
        });
        Ok(id)
    }

    /// Snapshot of proposal `id`.
    pub fn get(&self, id: ProposalId) -> Result<Proposal, GovernanceError> {
        self.inspect(id, Proposal::clone)
    }

    /// Run `f` against proposal `id` under its lock, without cloning it.
    pub fn inspect<R>(
        &self,
        id: ProposalId,
        f: impl FnOnce(&Proposal) -> R,
    ) -> Result<R, GovernanceError> {
        let slot = self.slot(id)?;
        let proposal = lock(&slot);
        Ok(f(&*proposal))
    }

    /// Whether `voter` could vote on `id` at `now`, ignoring weight.
    ///
    /// Checks run in order: unknown id, zero voter, window, repeat voter.
    pub fn ensure_can_vote(
        &self,
        id: ProposalId,
        voter: &AccountId,
        now: Timestamp,
    ) -> Result<(), GovernanceError> {
        self.inspect(id, |p| check_can_vote(p, voter, now))?
    }

    pub fn count(&self) -> u64 {
        self.proposals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as u64
    }

    /// Record `voter`'s vote with a precomputed `weight`.
    ///
    /// Zero weights are accepted here; refusing them is engine policy, which
    /// is why only the engine may call this.
    pub(crate) fn record_vote(
        &self,
        id: ProposalId,
        voter: AccountId,
        support: bool,
        weight: TokenAmount,
        now: Timestamp,
    ) -> Result<VoteReceipt, GovernanceError> {
        let slot = self.slot(id)?;
        let mut proposal = lock(&slot);
        check_can_vote(&proposal, &voter, now)?;

        let receipt = VoteReceipt {
            support,
            weight,
            cast_at: now,
        };
        proposal.receipts.insert(voter, receipt);
        if support {
            proposal.for_votes = proposal.for_votes.saturating_add(weight);
        } else {
            proposal.against_votes = proposal.against_votes.saturating_add(weight);
        }
        self.events.emit(GovernanceEvent::VoteCast {
            id,
            voter,
            support,
            weight,
        });
        debug!(
            proposal = %id,
            for_votes = %proposal.for_votes,
            against_votes = %proposal.against_votes,
            "tally updated"
        );
        Ok(receipt)
    }

    /// Flip `executed` once voting has closed and `guard` accepts the
    /// proposal. `guard` runs under the same lock, after the closed and
    /// already-executed checks.
    pub(crate) fn mark_executed_if(
        &self,
        id: ProposalId,
        now: Timestamp,
        guard: impl FnOnce(&Proposal) -> Result<(), GovernanceError>,
    ) -> Result<Proposal, GovernanceError> {
        let slot = self.slot(id)?;
        let mut proposal = lock(&slot);
        if !proposal.is_closed(now) {
            return Err(GovernanceError::NotClosed(id));
        }
        if proposal.executed {
            return Err(GovernanceError::AlreadyExecuted(id));
        }
        guard(&*proposal)?;
        proposal.executed = true;
        self.events.emit(GovernanceEvent::ProposalExecuted { id });
        Ok(proposal.clone())
    }

    pub fn receipt(
        &self,
        id: ProposalId,
        voter: &AccountId,
    ) -> Result<Option<VoteReceipt>, GovernanceError> {
        self.inspect(id, |p| p.receipts.get(voter).copied())
    }

    /// Snapshots of all proposals in id order, optionally filtered by their
    /// status at `now`.
    pub fn proposals(&self, status: Option<ProposalStatus>, now: Timestamp) -> Vec<Proposal> {
        self.slots()
            .iter()
            .map(lock)
            .filter(|p| status.map_or(true, |s| p.status(now) == s))
            .map(|p| p.clone())
            .collect()
    }
}

impl ProposalStore {
    /// Serialize every proposal, receipts included.
    pub fn save_state(&self) -> Result<Vec<u8>, GovernanceError> {
        let proposals: Vec<Proposal> = self.slots().iter().map(|s| lock(s).clone()).collect();
        bincode::serialize(&proposals).map_err(|e| GovernanceError::Snapshot(e.to_string()))
    }

    /// Restore a store from [`save_state`](Self::save_state) bytes.
    pub fn load_state(data: &[u8], events: Arc<EventLog>) -> Result<Self, GovernanceError> {
        let proposals: Vec<Proposal> =
            bincode::deserialize(data).map_err(|e| GovernanceError::Snapshot(e.to_string()))?;
        for (index, proposal) in proposals.iter().enumerate() {
            if proposal.id.raw() != index as u64 + 1 {
                return Err(GovernanceError::Snapshot(format!(
                    "proposal {} stored at position {}",
                    proposal.id,
                    index + 1
                )));
            }
            if proposal.end_time <= proposal.start_time {
                return Err(GovernanceError::Snapshot(format!(
                    "proposal {} ends before it starts",
                    proposal.id
                )));
            }
        }
        Ok(Self {
            proposals: RwLock::new(
                proposals
                    .into_iter()
                    .map(|p| Arc::new(Mutex::new(p)))
                    .collect(),
            ),
            events,
        })
    }
}
