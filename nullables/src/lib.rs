//! Nullable infrastructure for deterministic testing.
//!
//! The governance core reaches the outside world through two seams: the
//! [`Clock`](tally_types::Clock) and the
//! [`BalanceLedger`](tally_ledger::BalanceLedger). This crate provides
//! implementations of both that:
//! - return deterministic values
//! - can be controlled programmatically, including injected failures
//! - are safe to share across threads
//!
//! Usage: hand these to the engine in tests instead of real collaborators.

pub mod clock;
pub mod ledger;

pub use clock::NullClock;
pub use ledger::NullLedger;
