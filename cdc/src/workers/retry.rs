use config::shared::RetryConfig;
use metrics::counter;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::CdcResult;
use crate::metrics::{CDC_RETRIES_TOTAL, ERROR_KIND_LABEL, OPERATION_LABEL};
use crate::workers::policy::{RetryDirective, build_error_handling_policy};

/// Share of the backoff delay added as random jitter.
const JITTER_RATIO: f64 = 0.1;

/// Runs `operation` until it succeeds or fails with an error that must not be retried.
///
/// Only errors classified as [`RetryDirective::Timed`] are retried, at most
/// `config.max_attempts - 1` times, waiting [`RetryConfig::backoff`] plus jitter in between.
/// A shutdown received while waiting gives up and returns the last error.
pub async fn with_retry<T, F, Fut>(
    operation: &'static str,
    config: &RetryConfig,
    shutdown_rx: &ShutdownRx,
    mut run: F,
) -> CdcResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CdcResult<T>>,
{
    let mut shutdown_rx = shutdown_rx.clone();
    let mut attempt: u32 = 1;

    loop {
        let err = match run().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let policy = build_error_handling_policy(&err);
        if policy.retry_directive() != RetryDirective::Timed || attempt >= config.max_attempts {
            return Err(err);
        }

        let delay = jittered(config.backoff(attempt));
        warn!(
            operation,
            attempt,
            max_attempts = config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "operation failed, retrying"
        );
        counter!(
            CDC_RETRIES_TOTAL,
            OPERATION_LABEL => operation,
            ERROR_KIND_LABEL => format!("{:?}", err.kind()),
        )
        .increment(1);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => {
                info!(operation, "shutdown received while waiting to retry");
                return Err(err);
            }
        }

        attempt += 1;
    }
}

fn jittered(delay: Duration) -> Duration {
    let max_jitter = (delay.as_millis() as f64 * JITTER_RATIO) as u64;
    if max_jitter == 0 {
        return delay;
    }

    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter))
}
