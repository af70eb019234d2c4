//! Shared configuration types for cdc pipelines.

mod base;
mod batch;
mod pipeline;
mod retry;
mod target;

pub use base::ValidationError;
pub use batch::BatchConfig;
pub use pipeline::PipelineConfig;
pub use retry::RetryConfig;
pub use target::{ExpectationAction, ExpectationConfig, HistoryMode, TargetConfig};
