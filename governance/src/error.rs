use crate::proposal::ProposalId;
use tally_ledger::LedgerError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GovernanceError {
    #[error("proposal {0} not found")]
    NotFound(ProposalId),

    #[error("invalid voting period: {0}s")]
    InvalidPeriod(u64),

    #[error("proposal title must not be empty")]
    EmptyTitle,

    #[error("proposal {0} is not open for voting")]
    NotActive(ProposalId),

    #[error("account {voter} has already voted on proposal {proposal}")]
    AlreadyVoted { proposal: ProposalId, voter: String },

    #[error("account {0} has no voting power")]
    ZeroWeight(String),

    #[error("voting on proposal {0} has not closed yet")]
    NotClosed(ProposalId),

    #[error("proposal {0} has already been executed")]
    AlreadyExecuted(ProposalId),

    #[error("proposal {0} did not pass")]
    NotPassed(ProposalId),

    #[error("invalid account: {0}")]
    InvalidAccount(String),

    #[error("balance ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("insufficient voting power to propose: have {have}, need {need}")]
    InsufficientPower { have: u128, need: u128 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl From<LedgerError> for GovernanceError {
    fn from(err: LedgerError) -> Self {
        Self::LedgerUnavailable(err.to_string())
    }
}
