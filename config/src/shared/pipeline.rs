use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::shared::{BatchConfig, RetryConfig, TargetConfig, ValidationError};

/// Configuration of a cdc pipeline.
///
/// A pipeline drives one worker per target. Targets are independent of each other and
/// only share the store and the retry and batching settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Identifier of the pipeline, used in logs and metrics.
    pub id: u64,
    /// Targets fed by the pipeline.
    pub targets: Vec<TargetConfig>,
    /// Micro-batch sizing.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Retry settings for source reads and store commits.
    #[serde(default)]
    pub commit_retry: RetryConfig,
    /// Maximum number of keys merged concurrently within one target.
    #[serde(default = "default_max_parallel_keys")]
    pub max_parallel_keys: u16,
    /// Delay between polls of an exhausted source for continuous targets.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl PipelineConfig {
    pub const DEFAULT_MAX_PARALLEL_KEYS: u16 = 16;
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

    /// Validates the pipeline settings and every target.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.batch.validate()?;
        self.commit_retry.validate()?;

        if self.max_parallel_keys == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "max_parallel_keys".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        let mut names = HashSet::with_capacity(self.targets.len());
        for target in &self.targets {
            target.validate()?;

            if !names.insert(target.name.as_str()) {
                return Err(ValidationError::DuplicateTargetName(target.name.clone()));
            }
        }

        Ok(())
    }

    /// Returns the target named `name`.
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|target| target.name == name)
    }
}

fn default_max_parallel_keys() -> u16 {
    PipelineConfig::DEFAULT_MAX_PARALLEL_KEYS
}

fn default_poll_interval_ms() -> u64 {
    PipelineConfig::DEFAULT_POLL_INTERVAL_MS
}
