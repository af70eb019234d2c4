use anyhow::{Context, bail};
use cdc::pipeline::Pipeline;
use cdc::source::SourceReader;
use cdc::store::{FileTableStore, TargetStore};
use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::config::RunnerConfig;
use crate::source::JsonLinesSource;

/// Options given on the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Targets to run, every configured target when empty.
    pub targets: Vec<String>,
    /// Forces every selected target to stop once its source is exhausted.
    pub once: bool,
    /// Forces a full refresh of every selected target.
    pub full_refresh: bool,
}

/// Runs the configured pipeline into a file store until it completes or is interrupted.
pub async fn start_runner(mut config: RunnerConfig, options: RunOptions) -> anyhow::Result<()> {
    select_targets(&mut config, &options)?;

    let store =
        FileTableStore::open_with_compaction(&config.store_dir, config.compact_after_entries)
            .await
            .with_context(|| {
                format!("failed to open store at '{}'", config.store_dir.display())
            })?;

    let sources: HashMap<String, JsonLinesSource> = config
        .sources
        .iter()
        .map(|source| (source.name.clone(), JsonLinesSource::new(source)))
        .collect();

    let pipeline = Pipeline::new(config.pipeline, store, sources)?;
    start_pipeline(pipeline).await
}

/// Restricts the pipeline to the targets named in `options` and applies the overrides.
fn select_targets(config: &mut RunnerConfig, options: &RunOptions) -> anyhow::Result<()> {
    for name in &options.targets {
        if config.pipeline.target(name).is_none() {
            bail!("target '{name}' is not configured");
        }
    }

    if !options.targets.is_empty() {
        config
            .pipeline
            .targets
            .retain(|target| options.targets.contains(&target.name));
    }

    for target in &mut config.pipeline.targets {
        target.once |= options.once;
        target.full_refresh |= options.full_refresh;
    }

    Ok(())
}

async fn start_pipeline<R, S>(mut pipeline: Pipeline<R, S>) -> anyhow::Result<()>
where
    R: SourceReader + Clone + Send + Sync + 'static,
    S: TargetStore + Clone + Send + Sync + 'static,
{
    pipeline.start().await?;

    let shutdown_tx = pipeline.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {:?}", err);
            return;
        }

        info!("ctrl-c received, shutting down pipeline");
        if let Err(err) = shutdown_tx.shutdown() {
            warn!("failed to send shutdown signal: {:?}", err);
        }
    });

    let result = pipeline.wait().await;

    // The pipeline may finish on its own when every target runs once.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    let reports = result?;
    for report in &reports {
        info!(
            target_name = %report.target,
            batches = report.batches,
            records_read = report.records_read,
            admitted = report.validation.admitted,
            dropped = report.validation.dropped,
            warned = report.validation.warned,
            versions_opened = report.merge.versions_opened,
            versions_closed = report.merge.versions_closed,
            late_corrections = report.merge.late_corrections,
            next_offset = report.watermark.next_offset,
            "target run completed"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::shared::{HistoryMode, PipelineConfig, TargetConfig};
    use std::path::PathBuf;

    fn target(name: &str) -> TargetConfig {
        TargetConfig {
            name: name.to_string(),
            source: format!("{name}_stg"),
            keys: vec!["id".to_string()],
            sequence_by: "seq".to_string(),
            history_mode: HistoryMode::FullHistory,
            track_history_except_column_list: vec![],
            except_column_list: vec![],
            expectations: vec![],
            apply_as_deletes: None,
            ignore_null_updates: false,
            once: false,
            full_refresh: false,
        }
    }

    fn config() -> RunnerConfig {
        RunnerConfig {
            pipeline: PipelineConfig {
                id: 1,
                targets: vec![target("dimdate"), target("dimuser"), target("factstream")],
                batch: Default::default(),
                commit_retry: Default::default(),
                max_parallel_keys: 4,
                poll_interval_ms: 100,
            },
            store_dir: PathBuf::from("data"),
            compact_after_entries: 10,
            sources: vec![],
        }
    }

    #[test]
    fn selects_targets_and_applies_overrides() {
        let mut config = config();
        let options = RunOptions {
            targets: vec!["dimuser".to_string()],
            once: true,
            full_refresh: false,
        };

        select_targets(&mut config, &options).unwrap();

        assert_eq!(config.pipeline.targets.len(), 1);
        assert_eq!(config.pipeline.targets[0].name, "dimuser");
        assert!(config.pipeline.targets[0].once);
    }

    #[test]
    fn unknown_target_is_rejected() {
        let mut config = config();
        let options = RunOptions {
            targets: vec!["dimartist".to_string()],
            ..Default::default()
        };

        assert!(select_targets(&mut config, &options).is_err());
    }
}
