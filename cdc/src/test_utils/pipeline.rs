use config::shared::{BatchConfig, PipelineConfig, RetryConfig, TargetConfig};
use std::collections::HashMap;

use crate::error::CdcResult;
use crate::pipeline::{Pipeline, PipelineId};
use crate::source::SourceReader;
use crate::store::TargetStore;
use crate::workers::target::RunReport;

/// Pipeline configuration with millisecond retry delays, suitable for tests.
pub fn test_pipeline_config(id: PipelineId, targets: Vec<TargetConfig>) -> PipelineConfig {
    PipelineConfig {
        id,
        targets,
        batch: BatchConfig::default(),
        commit_retry: RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
        },
        max_parallel_keys: 4,
        poll_interval_ms: 10,
    }
}

/// Creates, starts and waits for a pipeline.
pub async fn run_pipeline<R, S>(
    config: PipelineConfig,
    store: S,
    sources: HashMap<String, R>,
) -> CdcResult<Vec<RunReport>>
where
    R: SourceReader + Clone + Send + Sync + 'static,
    S: TargetStore + Clone + Send + Sync + 'static,
{
    let mut pipeline = Pipeline::new(config, store, sources)?;
    pipeline.start().await?;
    pipeline.wait().await
}

/// Maps a single source to its name, as expected by [`Pipeline::new`].
pub fn single_source<R>(name: &str, source: R) -> HashMap<String, R> {
    HashMap::from([(name.to_string(), source)])
}
