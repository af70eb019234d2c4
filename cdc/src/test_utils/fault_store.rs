use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cdc_error;
use crate::error::{CdcResult, ErrorKind};
use crate::store::TargetStore;
use crate::types::{BusinessKey, ChainDelta, TargetMetadata, TargetRow, VersionChain};

#[derive(Debug, Default)]
struct Faults {
    failing_commits: u32,
    kind: Option<ErrorKind>,
    commits: u64,
    failed_commits: u64,
}

/// Store wrapper failing commits on demand.
///
/// Everything but [`TargetStore::commit`] is forwarded untouched.
#[derive(Debug, Clone)]
pub struct FaultInjectingStore<S> {
    inner: S,
    faults: Arc<Mutex<Faults>>,
}

impl<S> FaultInjectingStore<S> {
    pub fn wrap(inner: S) -> Self {
        Self {
            inner,
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    /// Makes the next `count` commits fail with `kind` without reaching the wrapped store.
    pub async fn fail_next_commits(&self, count: u32, kind: ErrorKind) {
        let mut faults = self.faults.lock().await;
        faults.failing_commits = count;
        faults.kind = Some(kind);
    }

    /// Returns the number of commits that reached the wrapped store.
    pub async fn commits(&self) -> u64 {
        self.faults.lock().await.commits
    }

    /// Returns the number of commits failed by the wrapper.
    pub async fn failed_commits(&self) -> u64 {
        self.faults.lock().await.failed_commits
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S> TargetStore for FaultInjectingStore<S>
where
    S: TargetStore + Send + Sync,
{
    async fn read_chain(&self, target: &str, key: &BusinessKey) -> CdcResult<VersionChain> {
        self.inner.read_chain(target, key).await
    }

    async fn commit(&self, target: &str, delta: ChainDelta) -> CdcResult<()> {
        {
            let mut faults = self.faults.lock().await;
            if faults.failing_commits > 0 {
                faults.failing_commits -= 1;
                faults.failed_commits += 1;

                return Err(cdc_error!(
                    faults.kind.unwrap_or(ErrorKind::CommitFailed),
                    "Injected commit failure",
                    format!("Commit of key {} in target '{target}' was failed on purpose", delta.key)
                ));
            }
            faults.commits += 1;
        }

        self.inner.commit(target, delta).await
    }

    async fn current_rows(&self, target: &str) -> CdcResult<Vec<TargetRow>> {
        self.inner.current_rows(target).await
    }

    async fn get_target_metadata(&self, target: &str) -> CdcResult<Option<TargetMetadata>> {
        self.inner.get_target_metadata(target).await
    }

    async fn store_target_metadata(&self, metadata: TargetMetadata) -> CdcResult<()> {
        self.inner.store_target_metadata(metadata).await
    }

    async fn truncate_target(&self, target: &str) -> CdcResult<()> {
        self.inner.truncate_target(target).await
    }
}
