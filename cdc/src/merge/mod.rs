//! Merging of ordered per-key changes into version chains.
//!
//! Latest-state targets keep one row per key, full-history targets keep every version with
//! its effective range.

mod engine;
mod history;
mod latest;
mod stats;

pub use engine::{MergeOutcome, MergeSettings, apply};
pub use stats::MergeStats;
