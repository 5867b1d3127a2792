//! Governance proposals and their lifecycle.
//!
//! Lifecycle status is never stored. It is recomputed from
//! `(now, start_time, end_time, executed)` on every query:
//!
//! ```text
//! Pending ──start──▶ Active ──end──▶ Closed ──execute──▶ Executed
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tally_types::{AccountId, Timestamp, TokenAmount};

/// Proposal identifier. Allocated sequentially from 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProposalId(u64);

impl ProposalId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Derived lifecycle position of a proposal at some instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalStatus {
    /// Voting has not opened yet.
    Pending,
    /// `start_time <= now < end_time`.
    Active,
    /// Voting window elapsed; not executed.
    Closed,
    /// Terminal.
    Executed,
}

/// Result of a closed proposal. Ties are rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Passed,
    Rejected,
}

/// One account's recorded vote, with the weight captured when it was cast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub support: bool,
    pub weight: TokenAmount,
    pub cast_at: Timestamp,
}

/// A governance proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub title: String,
    pub description: String,
    pub proposer: AccountId,
    pub start_time: Timestamp,
    /// Always strictly after `start_time`.
    pub end_time: Timestamp,
    pub for_votes: TokenAmount,
    pub against_votes: TokenAmount,
    pub executed: bool,
    /// Keyed by voter; the key set is the proposal's voter set.
    pub receipts: BTreeMap<AccountId, VoteReceipt>,
}

impl Proposal {
    pub fn status(&self, now: Timestamp) -> ProposalStatus {
        if self.executed {
            ProposalStatus::Executed
        } else if now < self.start_time {
            ProposalStatus::Pending
        } else if now < self.end_time {
            ProposalStatus::Active
        } else {
            ProposalStatus::Closed
        }
    }

    pub fn is_active(&self, now: Timestamp) -> bool {
        self.start_time <= now && now < self.end_time
    }

    pub fn is_closed(&self, now: Timestamp) -> bool {
        now >= self.end_time
    }

    /// Tally verdict, regardless of whether voting has closed.
    pub fn tally_outcome(&self) -> Outcome {
        if self.for_votes > self.against_votes {
            Outcome::Passed
        } else {
            Outcome::Rejected
        }
    }

    pub fn has_voted(&self, voter: &AccountId) -> bool {
        self.receipts.contains_key(voter)
    }

    pub fn voters(&self) -> impl Iterator<Item = &AccountId> {
        self.receipts.keys()
    }

    pub fn vote_count(&self) -> usize {
        self.receipts.len()
    }

    pub fn total_votes(&self) -> TokenAmount {
        self.for_votes.saturating_add(self.against_votes)
    }
}
