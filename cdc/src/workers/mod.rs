pub mod base;
pub mod policy;
pub mod pool;
pub mod retry;
pub mod target;
