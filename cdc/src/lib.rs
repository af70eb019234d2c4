//! Auto-CDC merge engine.
//!
//! Change records flow from a [`source::SourceReader`] through the [`validation`] rules and
//! the [`sequencer`] into the [`merge`] engine, which maintains latest-state (SCD type 1) or
//! full-history (SCD type 2) targets in a [`store::TargetStore`]. A [`pipeline::Pipeline`]
//! drives one worker per target.

pub mod concurrency;
pub mod conversions;
pub mod error;
pub mod failpoints;
mod macros;
pub mod merge;
pub mod metrics;
pub mod pipeline;
pub mod sequencer;
pub mod source;
pub mod store;
pub mod target;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod validation;
pub mod workers;
