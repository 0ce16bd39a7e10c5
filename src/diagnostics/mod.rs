//! Diagnostics for operators running the feature pipeline.
//!
//! Soft warnings (sparse windows, zero-valued statistics, skipped lines)
//! are logged through `tracing` and counted here so a run can be audited
//! after the fact.

pub mod log;

// Re-export commonly used types
pub use log::{create_shared_stats, RunStats, RunSummary, SharedRunStats};
