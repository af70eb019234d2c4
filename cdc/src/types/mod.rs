//! Core data types shared by the validator, the sequencer, the merge engine and the stores.

mod cell;
mod chain;
mod key;
mod metadata;
mod record;
mod schema;
mod sequence;
mod target_row;

pub use cell::*;
pub use chain::*;
pub use key::*;
pub use metadata::*;
pub use record::*;
pub use schema::*;
pub use sequence::*;
pub use target_row::*;
