//! Configuration shared by the cdc engine and the runner service.
//!
//! Holds the declarative target and pipeline definitions together with the hierarchical
//! loader used by services.

pub mod environment;
pub mod load;
pub mod shared;
