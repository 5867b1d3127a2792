//! Fundamental types for the tally governance engine.
//!
//! Shared by every crate in the workspace: account identifiers, token
//! amounts, timestamps and the clock seam.

pub mod address;
pub mod amount;
pub mod error;
pub mod time;

pub use address::AccountId;
pub use amount::TokenAmount;
pub use error::TypesError;
pub use time::{Clock, SystemClock, Timestamp};
