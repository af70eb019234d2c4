use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::cdc_error;
use crate::error::{CdcResult, ErrorKind};
use crate::workers::base::WorkerHandle;
use crate::workers::target::{RunReport, TargetWorkerHandle, TargetWorkerState};

#[derive(Debug)]
struct TargetWorkerPoolInner {
    /// States of the workers still registered, by target name.
    active: HashMap<String, TargetWorkerState>,
    join_set: JoinSet<(String, CdcResult<RunReport>)>,
}

/// Pool owning the target workers of a pipeline.
///
/// Targets are independent: one failing worker does not stop the others, and [`wait_all`]
/// only returns once every worker completed.
///
/// [`wait_all`]: TargetWorkerPool::wait_all
#[derive(Debug, Clone)]
pub struct TargetWorkerPool {
    inner: Arc<Mutex<TargetWorkerPoolInner>>,
}

impl TargetWorkerPool {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TargetWorkerPoolInner {
                active: HashMap::new(),
                join_set: JoinSet::new(),
            })),
        }
    }

    /// Adds a started worker to the pool.
    ///
    /// A second worker for the same target is refused while the first one is registered.
    pub async fn insert(&self, target: String, handle: TargetWorkerHandle) {
        let mut inner = self.inner.lock().await;

        if inner.active.contains_key(&target) {
            warn!(target_name = %target, "worker already exists in pool");
            return;
        }

        inner.active.insert(target.clone(), handle.state());
        let name = target.clone();
        inner.join_set.spawn(async move {
            let result = handle.wait().await;
            (name, result)
        });

        debug!(target_name = %target, "added worker to pool");
    }

    /// Returns the state of the worker of `target`, if it is still registered.
    pub async fn get_worker_state(&self, target: &str) -> Option<TargetWorkerState> {
        self.inner.lock().await.active.get(target).cloned()
    }

    /// Waits for every worker and returns their reports ordered by target name.
    ///
    /// Errors of all failed workers are aggregated into one error.
    pub async fn wait_all(&self) -> CdcResult<Vec<RunReport>> {
        let mut reports = Vec::new();
        let mut errors = Vec::new();

        loop {
            let result = {
                let mut inner = self.inner.lock().await;
                inner.join_set.join_next().await
            };

            let Some(result) = result else {
                break;
            };

            match result {
                Ok((target, worker_result)) => {
                    self.inner.lock().await.active.remove(&target);

                    match worker_result {
                        Ok(report) => reports.push(report),
                        Err(err) => {
                            error!(target_name = %target, error = %err, "worker completed with error");
                            errors.push(err);
                        }
                    }
                }
                Err(join_err) => {
                    if join_err.is_cancelled() {
                        debug!("worker task was cancelled");
                    } else {
                        errors.push(cdc_error!(
                            ErrorKind::TargetWorkerPanic,
                            "A panic occurred in the target worker",
                            join_err
                        ));
                    }
                }
            }
        }

        self.inner.lock().await.active.clear();

        if !errors.is_empty() {
            return Err(errors.into());
        }

        reports.sort_by(|a, b| a.target.cmp(&b.target));
        Ok(reports)
    }
}

impl Default for TargetWorkerPool {
    fn default() -> Self {
        Self::new()
    }
}
