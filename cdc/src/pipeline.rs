use config::shared::PipelineConfig;
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::bail;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::error::{CdcResult, ErrorKind};
use crate::source::SourceReader;
use crate::store::TargetStore;
use crate::target::{RegisteredTarget, TargetRegistry};
use crate::types::Watermark;
use crate::workers::base::Worker;
use crate::workers::pool::TargetWorkerPool;
use crate::workers::target::{RunReport, TargetWorker, TargetWorkerState};

pub type PipelineId = u64;

#[derive(Debug)]
enum PipelineState {
    NotStarted,
    Started { pool: TargetWorkerPool },
}

/// Runs the targets of a [`PipelineConfig`] against a store.
///
/// Every target reads from the source named by its `source` field. Targets are registered when
/// the pipeline is created, so configuration errors surface before anything is read.
#[derive(Debug)]
pub struct Pipeline<R, S> {
    id: PipelineId,
    config: Arc<PipelineConfig>,
    registry: TargetRegistry,
    sources: HashMap<String, R>,
    store: S,
    state: PipelineState,
    shutdown_tx: ShutdownTx,
}

impl<R, S> Pipeline<R, S>
where
    R: SourceReader + Clone + Send + Sync + 'static,
    S: TargetStore + Clone + Send + Sync + 'static,
{
    pub fn new(config: PipelineConfig, store: S, sources: HashMap<String, R>) -> CdcResult<Self> {
        config.validate()?;

        let mut registry = TargetRegistry::new();
        for target in &config.targets {
            let Some(source) = sources.get(&target.source) else {
                bail!(
                    ErrorKind::ConfigError,
                    "Unknown source",
                    format!(
                        "Target '{}' reads from source '{}', which was not provided",
                        target.name, target.source
                    )
                );
            };

            registry.register(target.clone(), source.table_schema())?;
        }

        // Receivers are created per worker through `subscribe`.
        let (shutdown_tx, _) = create_shutdown_channel();

        Ok(Self {
            id: config.id,
            config: Arc::new(config),
            registry,
            sources,
            store,
            state: PipelineState::NotStarted,
            shutdown_tx,
        })
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Returns the registered target named `name`.
    pub fn target(&self, name: &str) -> Option<&Arc<RegisteredTarget>> {
        self.registry.get(name)
    }

    /// Returns the progress of the worker of `target` while the pipeline runs.
    pub async fn worker_state(&self, target: &str) -> Option<TargetWorkerState> {
        match &self.state {
            PipelineState::NotStarted => None,
            PipelineState::Started { pool } => pool.get_worker_state(target).await,
        }
    }

    /// Prepares every target and starts one worker per target.
    pub async fn start(&mut self) -> CdcResult<()> {
        if let PipelineState::Started { .. } = self.state {
            bail!(
                ErrorKind::InvalidState,
                "Pipeline already started",
                format!("Pipeline {} was already started", self.id)
            );
        }

        info!(
            pipeline_id = self.id,
            targets = self.registry.len(),
            "starting pipeline"
        );

        try_join_all(
            self.registry
                .iter()
                .map(|target| prepare_target(&self.store, target)),
        )
        .await?;

        let pool = TargetWorkerPool::new();
        for target in self.registry.iter() {
            let Some(source) = self.sources.get(&target.config().source) else {
                bail!(
                    ErrorKind::InvalidState,
                    "Source disappeared",
                    format!("No source is registered for target '{}'", target.name())
                );
            };

            let handle = TargetWorker::new(
                self.id,
                self.config.clone(),
                target.clone(),
                source.clone(),
                self.store.clone(),
                self.shutdown_tx.subscribe(),
            )
            .start()
            .await?;

            pool.insert(target.name().to_string(), handle).await;
        }

        self.state = PipelineState::Started { pool };

        Ok(())
    }

    /// Waits for every worker and returns their reports ordered by target name.
    ///
    /// The errors of all failed targets are aggregated.
    pub async fn wait(self) -> CdcResult<Vec<RunReport>> {
        let PipelineState::Started { pool } = self.state else {
            info!("pipeline was not started, nothing to wait for");

            return Ok(vec![]);
        };

        info!(pipeline_id = self.id, "waiting for target workers to complete");

        let result = pool.wait_all().await;
        if let Err(err) = &result {
            // The kinds are used as an approximation of the number of failures.
            warn!(
                pipeline_id = self.id,
                failures = err.kinds().len(),
                "target workers failed with an error"
            );
        }

        result
    }

    pub fn shutdown(&self) {
        info!("trying to shut down the pipeline");

        if let Err(err) = self.shutdown_tx.shutdown() {
            error!("failed to send shutdown signal to the pipeline: {}", err);
            return;
        }

        info!("shut down signal successfully sent to all workers");
    }

    pub async fn shutdown_and_wait(self) -> CdcResult<Vec<RunReport>> {
        self.shutdown();
        self.wait().await
    }
}

/// Makes the stored state of `target` match its definition.
///
/// A full refresh clears the target and starts over from offset zero. Otherwise the stored
/// metadata must match the definition, or is created for a new target.
async fn prepare_target<S>(store: &S, target: &RegisteredTarget) -> CdcResult<()>
where
    S: TargetStore,
{
    if target.config().full_refresh {
        info!(target_name = target.name(), "full refresh requested, truncating target");

        store.truncate_target(target.name()).await?;
        store
            .store_target_metadata(target.metadata(Watermark::default()))
            .await?;

        return Ok(());
    }

    match store.get_target_metadata(target.name()).await? {
        Some(stored) => {
            target.check_metadata(&stored)?;
            info!(
                target_name = target.name(),
                next_offset = stored.watermark.next_offset,
                "resuming target from its watermark"
            );
        }
        None => {
            info!(target_name = target.name(), "initializing new target");
            store
                .store_target_metadata(target.metadata(Watermark::default()))
                .await?;
        }
    }

    Ok(())
}
