//! Readers of change records.

pub mod base;
pub mod memory;

pub use base::{SourceBatch, SourceReader};
pub use memory::MemorySource;
