//! Events emitted by the governance core, and the log that sequences them.

use crate::proposal::ProposalId;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tally_types::{AccountId, TokenAmount};

/// Something observable happened in the governance core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GovernanceEvent {
    ProposalCreated {
        id: ProposalId,
        proposer: AccountId,
        title: String,
    },
    VoteCast {
        id: ProposalId,
        voter: AccountId,
        support: bool,
        weight: TokenAmount,
    },
    /// `from` and `to` are effective delegatees: an account with no
    /// delegation set shows up as its own delegatee.
    DelegateChanged {
        delegator: AccountId,
        from: AccountId,
        to: AccountId,
    },
    /// A passed proposal was executed. Subscribers perform the effect.
    ProposalExecuted { id: ProposalId },
}

impl GovernanceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ProposalCreated { .. } => EventKind::ProposalCreated,
            Self::VoteCast { .. } => EventKind::VoteCast,
            Self::DelegateChanged { .. } => EventKind::DelegateChanged,
            Self::ProposalExecuted { .. } => EventKind::ProposalExecuted,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    ProposalCreated,
    VoteCast,
    DelegateChanged,
    ProposalExecuted,
}

/// What an event is about: a proposal, or a delegating account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSubject {
    Proposal(ProposalId),
    Delegator(AccountId),
}

/// An event stamped with its position in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedEvent {
    /// Strictly increasing, starting at 1.
    pub sequence: u64,
    pub event: GovernanceEvent,
}

impl SequencedEvent {
    /// Key a downstream consumer can deduplicate redelivered events by.
    pub fn dedup_key(&self) -> (EventKind, EventSubject, u64) {
        let subject = match &self.event {
            GovernanceEvent::ProposalCreated { id, .. }
            | GovernanceEvent::VoteCast { id, .. }
            | GovernanceEvent::ProposalExecuted { id } => EventSubject::Proposal(*id),
            GovernanceEvent::DelegateChanged { delegator, .. } => {
                EventSubject::Delegator(*delegator)
            }
        };
        (self.event.kind(), subject, self.sequence)
    }
}

type Listener = Arc<dyn Fn(&SequencedEvent) + Send + Sync>;

/// Append-only, sequenced event log with synchronous fan-out.
///
/// Listeners are invoked inline on the emitting thread, after the event has
/// been appended and with no log lock held, so a listener may subscribe
/// further listeners; those see the next event on. Keep handlers fast.
///
/// The emitting store may still hold its own lock, so a listener must not
/// call back into the registry, the proposal store or the engine.
#[derive(Default)]
pub struct EventLog {
    entries: Mutex<Vec<SequencedEvent>>,
    listeners: RwLock<Vec<Listener>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&SequencedEvent) + Send + Sync + 'static) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Append `event` and notify listeners. Returns the assigned sequence.
    pub fn emit(&self, event: GovernanceEvent) -> u64 {
        let sequenced = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let sequenced = SequencedEvent {
                sequence: entries.len() as u64 + 1,
                event,
            };
            entries.push(sequenced.clone());
            sequenced
        };
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in &listeners {
            listener(&sequenced);
        }
        sequenced.sequence
    }

    pub fn events(&self) -> Vec<SequencedEvent> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events with a sequence strictly greater than `sequence`.
    pub fn events_since(&self, sequence: u64) -> Vec<SequencedEvent> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let start = usize::try_from(sequence).unwrap_or(usize::MAX).min(entries.len());
        entries[start..].to_vec()
    }

    /// Sequence of the newest event, or 0 when empty.
    pub fn last_sequence(&self) -> u64 {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as u64
    }
}
