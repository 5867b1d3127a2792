//! Token-weighted governance core.
//!
//! Holders of a fungible balance create proposals and vote with their
//! balance plus whatever has been delegated to them (one hop). Proposals
//! pass when strictly more weight is for than against once the voting
//! window closes.
//!
//! Components, leaves first:
//! - [`DelegationRegistry`]: who votes with whose balance.
//! - [`VoteWeightResolver`]: effective power = own balance + delegated balances.
//! - [`ProposalStore`]: proposals, receipts and tallies.
//! - [`GovernanceEngine`]: the entry point enforcing cross-component rules.
//!
//! Balances come from an external [`BalanceLedger`](tally_ledger::BalanceLedger);
//! time from a [`Clock`](tally_types::Clock).

pub mod config;
pub mod delegation;
pub mod engine;
pub mod error;
pub mod events;
pub mod proposal;
pub mod store;
pub mod weight;

pub use config::GovernanceConfig;
pub use delegation::{DelegationChange, DelegationRegistry, DelegationSnapshot};
pub use engine::{GovernanceEngine, GovernanceStats};
pub use error::GovernanceError;
pub use events::{EventKind, EventLog, EventSubject, GovernanceEvent, SequencedEvent};
pub use proposal::{Outcome, Proposal, ProposalId, ProposalStatus, VoteReceipt};
pub use store::ProposalStore;
pub use weight::{VoteWeightResolver, WeightSnapshot};
