use fail::fail_point;

use crate::bail;
use crate::error::{CdcResult, ErrorKind};

pub const COMMIT_KEY_DELTA__BEFORE_COMMIT: &str = "commit_key_delta.before_commit";
pub const READ_SOURCE_BATCH__BEFORE_READ: &str = "read_source_batch.before_read";
pub const ADVANCE_WATERMARK__BEFORE_STORE: &str = "advance_watermark.before_store";

/// Triggers the fail point `name` when it is configured.
///
/// The fail point parameter selects the error kind and with it the retry behavior:
/// `no_retry`, `manual_retry` or `timed_retry`.
pub fn cdc_fail_point(name: &str) -> CdcResult<()> {
    fail_point!(name, |parameter| {
        let mut error_kind = ErrorKind::WithNoRetry;
        if let Some(parameter) = parameter {
            error_kind = match parameter.as_str() {
                "no_retry" => ErrorKind::WithNoRetry,
                "manual_retry" => ErrorKind::WithManualRetry,
                "timed_retry" => ErrorKind::WithTimedRetry,
                _ => ErrorKind::WithNoRetry,
            }
        }

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
