//! Target table storage.

pub mod base;
pub mod file;
pub mod memory;
mod tables;

pub use base::TargetStore;
pub use file::FileTableStore;
pub use memory::MemoryTableStore;
