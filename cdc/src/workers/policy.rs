use crate::error::{CdcError, ErrorKind};

/// Retry behavior for a classified error.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RetryDirective {
    /// The operation is retried automatically with backoff.
    Timed,
    /// The operation is only retried after an operator fixed the cause.
    Manual,
    /// The operation must not be retried.
    NoRetry,
}

/// How an [`CdcError`] is handled by workers.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ErrorHandlingPolicy {
    retry_directive: RetryDirective,
    solution: Option<&'static str>,
}

impl ErrorHandlingPolicy {
    const fn new(retry_directive: RetryDirective, solution: Option<&'static str>) -> Self {
        Self {
            retry_directive,
            solution,
        }
    }

    pub fn retry_directive(&self) -> RetryDirective {
        self.retry_directive
    }

    /// Returns an operator-facing hint, if any.
    pub fn solution(&self) -> Option<&'static str> {
        self.solution
    }
}

/// Classifies `error` into an [`ErrorHandlingPolicy`].
///
/// Aggregated errors are classified by their first kind.
pub fn build_error_handling_policy(error: &CdcError) -> ErrorHandlingPolicy {
    match error.kind() {
        // Keep this list narrow: only failures expected to go away on their own.
        ErrorKind::SourceReadFailed | ErrorKind::CommitFailed | ErrorKind::StoreIoError => {
            ErrorHandlingPolicy::new(RetryDirective::Timed, None)
        }

        ErrorKind::InvariantViolation => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Fix the offending change records at the source; null keys and null sequence values are never merged."),
        ),
        ErrorKind::ExpectationFailed => ErrorHandlingPolicy::new(
            RetryDirective::Manual,
            Some("Fix the records violating the failing expectation or relax its action, then rerun the target."),
        ),
        ErrorKind::RuleSetChanged => ErrorHandlingPolicy::new(
            RetryDirective::Manual,
            Some("Restore the previous expectations or rerun the target with full_refresh enabled."),
        ),
        ErrorKind::ConfigError
        | ErrorKind::InvalidRule
        | ErrorKind::UnknownColumn
        | ErrorKind::InvalidSequenceColumn
        | ErrorKind::DuplicateTarget => ErrorHandlingPolicy::new(
            RetryDirective::Manual,
            Some("Fix the target definition and restart the pipeline."),
        ),
        ErrorKind::DeserializationError => ErrorHandlingPolicy::new(
            RetryDirective::Manual,
            Some("Inspect the store journal of the target; a full refresh rebuilds it from the source."),
        ),

        #[cfg(any(test, feature = "failpoints"))]
        ErrorKind::WithNoRetry => {
            ErrorHandlingPolicy::new(RetryDirective::NoRetry, Some("Cannot retry this error."))
        }
        #[cfg(any(test, feature = "failpoints"))]
        ErrorKind::WithManualRetry => ErrorHandlingPolicy::new(
            RetryDirective::Manual,
            Some("Manually trigger retry after resolving the issue."),
        ),
        #[cfg(any(test, feature = "failpoints"))]
        ErrorKind::WithTimedRetry => ErrorHandlingPolicy::new(
            RetryDirective::Timed,
            Some("Will automatically retry after the configured delay."),
        ),

        _ => ErrorHandlingPolicy::new(
            RetryDirective::Manual,
            Some("There is no single prescribed solution for this error. Inspect the logs of the failing target and rerun it once the cause is fixed."),
        ),
    }
}
