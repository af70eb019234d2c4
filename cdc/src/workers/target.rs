use config::shared::{ExpectationAction, PipelineConfig, RetryConfig};
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use crate::concurrency::shutdown::{ShutdownRx, is_shutdown_requested};
use crate::error::{CdcError, CdcResult, ErrorKind};
use crate::failpoints::{
    ADVANCE_WATERMARK__BEFORE_STORE, COMMIT_KEY_DELTA__BEFORE_COMMIT,
    READ_SOURCE_BATCH__BEFORE_READ, cdc_fail_point,
};
use crate::merge::{self, MergeStats};
use crate::metrics::{
    CDC_BATCH_DURATION_SECONDS, CDC_BATCH_SIZE, CDC_LATE_CORRECTIONS_TOTAL,
    CDC_RECORDS_ADMITTED_TOTAL, CDC_RECORDS_DROPPED_TOTAL, CDC_RECORDS_READ_TOTAL,
    CDC_RULE_WARNINGS_TOTAL, CDC_STALE_CHANGES_TOTAL, CDC_TIES_RESOLVED_TOTAL,
    CDC_VERSIONS_CLOSED_TOTAL, CDC_VERSIONS_OPENED_TOTAL, CDC_WORKER_ERRORS_TOTAL,
    ERROR_KIND_LABEL, PIPELINE_ID_LABEL, RULE_LABEL, TARGET_LABEL,
};
use crate::pipeline::PipelineId;
use crate::sequencer::{self, KeyBatch, SequencerStats};
use crate::source::SourceReader;
use crate::store::TargetStore;
use crate::target::RegisteredTarget;
use crate::types::{ChangeRecord, SequenceValue, Watermark};
use crate::validation::ValidationReport;
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::policy::build_error_handling_policy;
use crate::workers::retry::with_retry;
use crate::{bail, cdc_error};

/// Summary of a target run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub target: String,
    /// Micro-batches processed, empty polls excluded.
    pub batches: u64,
    pub records_read: u64,
    pub validation: ValidationReport,
    pub sequencing: SequencerStats,
    pub merge: MergeStats,
    /// Watermark committed at the end of the last batch.
    pub watermark: Watermark,
}

/// Observable progress of a [`TargetWorker`].
#[derive(Debug, Clone)]
pub struct TargetWorkerState {
    progress: watch::Receiver<RunReport>,
}

impl TargetWorkerState {
    /// Returns the report as of the last committed batch.
    pub fn report(&self) -> RunReport {
        self.progress.borrow().clone()
    }

    /// Waits until the worker commits another batch.
    ///
    /// Returns `false` once the worker is gone.
    pub async fn changed(&mut self) -> bool {
        self.progress.changed().await.is_ok()
    }
}

#[derive(Debug)]
pub struct TargetWorkerHandle {
    state: TargetWorkerState,
    handle: Option<JoinHandle<CdcResult<RunReport>>>,
}

impl WorkerHandle<TargetWorkerState> for TargetWorkerHandle {
    type Output = RunReport;

    fn state(&self) -> TargetWorkerState {
        self.state.clone()
    }

    async fn wait(mut self) -> CdcResult<RunReport> {
        let Some(handle) = self.handle.take() else {
            return Ok(self.state.report());
        };

        handle.await.map_err(|err| {
            cdc_error!(
                ErrorKind::TargetWorkerPanic,
                "A panic occurred in the target worker",
                err
            )
        })?
    }
}

/// Worker feeding one target from its source.
///
/// Each micro-batch is read from the committed watermark, validated, sequenced and merged key
/// by key. The watermark only advances once every key of the batch was committed, so a failed
/// batch is read again on the next run.
#[derive(Debug)]
pub struct TargetWorker<R, S> {
    pipeline_id: PipelineId,
    config: Arc<PipelineConfig>,
    target: Arc<RegisteredTarget>,
    source: R,
    store: S,
    shutdown_rx: ShutdownRx,
}

impl<R, S> TargetWorker<R, S> {
    pub fn new(
        pipeline_id: PipelineId,
        config: Arc<PipelineConfig>,
        target: Arc<RegisteredTarget>,
        source: R,
        store: S,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            pipeline_id,
            config,
            target,
            source,
            store,
            shutdown_rx,
        }
    }
}

impl<R, S> Worker<TargetWorkerHandle, TargetWorkerState> for TargetWorker<R, S>
where
    R: SourceReader + Send + Sync + 'static,
    S: TargetStore + Clone + Send + Sync + 'static,
{
    type Error = CdcError;

    async fn start(self) -> CdcResult<TargetWorkerHandle> {
        let Some(metadata) = self.store.get_target_metadata(self.target.name()).await? else {
            bail!(
                ErrorKind::InvalidState,
                "Target was not prepared",
                format!("No metadata is stored for target '{}'", self.target.name())
            );
        };

        let report = RunReport {
            target: self.target.name().to_string(),
            watermark: metadata.watermark.clone(),
            ..RunReport::default()
        };
        let (progress_tx, progress_rx) = watch::channel(report.clone());

        let span = info_span!(
            "target_worker",
            pipeline_id = self.pipeline_id,
            target_name = self.target.name(),
            run_id = %Uuid::new_v4(),
        );

        info!(
            parent: &span,
            next_offset = metadata.watermark.next_offset,
            once = self.target.config().once,
            "starting target worker"
        );

        let pipeline_id = self.pipeline_id;
        let target_name = self.target.name().to_string();
        let run = async move {
            let result = self.run(report, progress_tx).await;

            if let Err(err) = &result {
                let policy = build_error_handling_policy(err);
                error!(
                    error = %err,
                    retry_directive = ?policy.retry_directive(),
                    solution = policy.solution(),
                    "target worker failed"
                );
                counter!(
                    CDC_WORKER_ERRORS_TOTAL,
                    PIPELINE_ID_LABEL => pipeline_id.to_string(),
                    TARGET_LABEL => target_name,
                    ERROR_KIND_LABEL => format!("{:?}", err.kind()),
                )
                .increment(1);
            }

            result
        };

        Ok(TargetWorkerHandle {
            state: TargetWorkerState {
                progress: progress_rx,
            },
            handle: Some(tokio::spawn(run.instrument(span))),
        })
    }
}

impl<R, S> TargetWorker<R, S>
where
    R: SourceReader + Send + Sync + 'static,
    S: TargetStore + Clone + Send + Sync + 'static,
{
    async fn run(
        mut self,
        mut report: RunReport,
        progress_tx: watch::Sender<RunReport>,
    ) -> CdcResult<RunReport> {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if is_shutdown_requested(&self.shutdown_rx) {
                info!("shutdown requested, stopping target worker");
                break;
            }

            let started_at = Instant::now();
            let from_offset = report.watermark.next_offset;
            let source = &self.source;
            let max_size = self.config.batch.max_size;
            let batch = with_retry(
                "read_source_batch",
                &self.config.commit_retry,
                &self.shutdown_rx,
                move || async move {
                    cdc_fail_point(READ_SOURCE_BATCH__BEFORE_READ)?;
                    source.read_batch(from_offset, max_size).await
                },
            )
            .await?;

            if batch.is_empty() {
                if self.target.config().once {
                    info!(next_offset = from_offset, "source exhausted, stopping target worker");
                    break;
                }

                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => continue,
                    _ = self.shutdown_rx.changed() => {
                        info!("shutdown requested while polling, stopping target worker");
                        break;
                    }
                }
            }

            let records_read = batch.records.len() as u64;
            let max_sequence = self.process_batch(batch.records, &mut report).await?;

            let watermark = report
                .watermark
                .advance(batch.next_offset, max_sequence.as_ref());
            let metadata = &self.target.metadata(watermark.clone());
            let store = &self.store;
            with_retry(
                "store_watermark",
                &self.config.commit_retry,
                &self.shutdown_rx,
                move || async move {
                    cdc_fail_point(ADVANCE_WATERMARK__BEFORE_STORE)?;
                    store.store_target_metadata(metadata.clone()).await
                },
            )
            .await?;

            report.batches += 1;
            report.records_read += records_read;
            report.watermark = watermark;
            progress_tx.send_replace(report.clone());

            histogram!(
                CDC_BATCH_DURATION_SECONDS,
                PIPELINE_ID_LABEL => self.pipeline_id.to_string(),
                TARGET_LABEL => self.target.name().to_string(),
            )
            .record(started_at.elapsed().as_secs_f64());
            histogram!(
                CDC_BATCH_SIZE,
                PIPELINE_ID_LABEL => self.pipeline_id.to_string(),
                TARGET_LABEL => self.target.name().to_string(),
            )
            .record(records_read as f64);

            debug!(
                records = records_read,
                next_offset = report.watermark.next_offset,
                "committed batch"
            );
        }

        info!(
            batches = report.batches,
            records_read = report.records_read,
            admitted = report.validation.admitted,
            dropped = report.validation.dropped,
            versions_opened = report.merge.versions_opened,
            versions_closed = report.merge.versions_closed,
            "target worker completed"
        );

        Ok(report)
    }

    /// Validates, sequences and merges one micro-batch.
    ///
    /// Keys are merged concurrently, bounded by `max_parallel_keys`. Every key task runs to
    /// completion even when another one failed, then all failures are returned together.
    /// Returns the highest sequence of the batch.
    async fn process_batch(
        &self,
        records: Vec<ChangeRecord>,
        report: &mut RunReport,
    ) -> CdcResult<Option<SequenceValue>> {
        let pipeline_id = self.pipeline_id.to_string();
        let target_name = self.target.name().to_string();

        counter!(
            CDC_RECORDS_READ_TOTAL,
            PIPELINE_ID_LABEL => pipeline_id.clone(),
            TARGET_LABEL => target_name.clone(),
        )
        .increment(records.len() as u64);

        let mut validation = ValidationReport::default();
        let admitted = self
            .target
            .validator()
            .validate_batch(self.target.name(), records, &mut validation)?;
        self.record_validation(&validation);
        report.validation.merge(&validation);

        let mut batches = sequencer::sequence(self.target.layout(), admitted)?;

        let permits = Arc::new(Semaphore::new(self.config.max_parallel_keys as usize));
        let mut join_set = JoinSet::new();
        let mut max_sequence: Option<SequenceValue> = None;

        for key_batch in batches.by_ref() {
            if let Some(sequence) = key_batch.max_sequence() {
                if max_sequence.as_ref().is_none_or(|max| sequence > max) {
                    max_sequence = Some(sequence.clone());
                }
            }

            let permit = permits.clone().acquire_owned().await.map_err(|err| {
                cdc_error!(
                    ErrorKind::InvalidState,
                    "Merge permits were closed",
                    err
                )
            })?;

            let store = self.store.clone();
            let target = self.target.clone();
            let retry = self.config.commit_retry.clone();
            let shutdown_rx = self.shutdown_rx.clone();
            join_set.spawn(async move {
                let _permit = permit;
                merge_key(&store, &target, &key_batch, &retry, &shutdown_rx).await
            });
        }

        let mut errors = Vec::new();
        let mut merge_stats = MergeStats::default();
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(Ok(stats)) => merge_stats += stats,
                Ok(Err(err)) => errors.push(err),
                Err(join_err) => errors.push(cdc_error!(
                    ErrorKind::MergeTaskPanic,
                    "A panic occurred while merging a key",
                    join_err
                )),
            }
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        let sequencing = batches.stats().clone();
        counter!(
            CDC_TIES_RESOLVED_TOTAL,
            PIPELINE_ID_LABEL => pipeline_id.clone(),
            TARGET_LABEL => target_name.clone(),
        )
        .increment(sequencing.ties_resolved);
        report.sequencing.merge(&sequencing);

        self.record_merge(&merge_stats);
        report.merge += merge_stats;

        Ok(max_sequence)
    }

    fn record_validation(&self, validation: &ValidationReport) {
        let pipeline_id = self.pipeline_id.to_string();
        let target_name = self.target.name().to_string();

        counter!(
            CDC_RECORDS_ADMITTED_TOTAL,
            PIPELINE_ID_LABEL => pipeline_id.clone(),
            TARGET_LABEL => target_name.clone(),
        )
        .increment(validation.admitted);

        for rule in self.target.validator().rules() {
            let Some(count) = validation.violations.get(rule.name()) else {
                continue;
            };

            let name = match rule.action() {
                ExpectationAction::Drop => CDC_RECORDS_DROPPED_TOTAL,
                _ => CDC_RULE_WARNINGS_TOTAL,
            };
            counter!(
                name,
                PIPELINE_ID_LABEL => pipeline_id.clone(),
                TARGET_LABEL => target_name.clone(),
                RULE_LABEL => rule.name().to_string(),
            )
            .increment(*count);
        }
    }

    fn record_merge(&self, stats: &MergeStats) {
        let pipeline_id = self.pipeline_id.to_string();
        let target_name = self.target.name().to_string();

        for (name, value) in [
            (CDC_VERSIONS_OPENED_TOTAL, stats.versions_opened),
            (CDC_VERSIONS_CLOSED_TOTAL, stats.versions_closed),
            (CDC_LATE_CORRECTIONS_TOTAL, stats.late_corrections),
            (CDC_STALE_CHANGES_TOTAL, stats.stale_ignored),
        ] {
            counter!(
                name,
                PIPELINE_ID_LABEL => pipeline_id.clone(),
                TARGET_LABEL => target_name.clone(),
            )
            .increment(value);
        }
    }
}

/// Merges the changes of one key and commits the resulting delta.
///
/// Every attempt reads the committed chain again, so a retried commit never applies a stale
/// delta.
async fn merge_key<S>(
    store: &S,
    target: &RegisteredTarget,
    batch: &KeyBatch,
    retry: &RetryConfig,
    shutdown_rx: &ShutdownRx,
) -> CdcResult<MergeStats>
where
    S: TargetStore + Sync,
{
    with_retry("commit_key_delta", retry, shutdown_rx, move || async move {
        let chain = store.read_chain(target.name(), &batch.key).await?;
        let outcome = merge::apply(&batch.key, &batch.changes, &chain, target.merge_settings())?;

        if outcome.delta.is_empty() {
            return Ok(outcome.stats);
        }

        cdc_fail_point(COMMIT_KEY_DELTA__BEFORE_COMMIT)?;
        store.commit(target.name(), outcome.delta).await?;

        Ok(outcome.stats)
    })
    .await
}
