use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The balance source could not be read (I/O, remote node down, ...).
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("insufficient balance for {account}: have {have}, need {need}")]
    InsufficientBalance {
        account: String,
        have: u128,
        need: u128,
    },
}
