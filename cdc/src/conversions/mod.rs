//! Conversions between external representations and [`crate::types::Cell`] values.

pub mod json;
pub mod text;
