//! Helpers shared by the unit tests, the integration tests and embedders testing their own
//! sources and stores.
//!
//! - [`schema`] builds the `items_stg` source used throughout the tests and targets over it.
//! - [`pipeline`] builds pipeline configurations with short retry delays and runs them.
//! - [`fault_store`] wraps a store and makes commits fail on demand.
//! - [`failpoints`] configures fail points for the duration of a test.

pub mod failpoints;
pub mod fault_store;
pub mod pipeline;
pub mod schema;
