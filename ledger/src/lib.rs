//! The token balance ledger, as seen from the governance core.
//!
//! The ledger itself (transfers, minting, persistence) lives outside this
//! workspace. The core only reads balances through [`BalanceLedger`] and may
//! be told about movements through [`BalanceChange`] notifications.

pub mod error;
pub mod ledger;

pub use error::LedgerError;
pub use ledger::{BalanceChange, BalanceLedger};
