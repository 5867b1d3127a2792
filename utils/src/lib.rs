//! Shared utilities for the tally workspace.

pub mod logging;
pub mod stats;
pub mod time;

pub use logging::{init_logging, init_tracing, try_init_test_logging, LogFormat};
pub use stats::StatsCounter;
pub use time::format_duration;
