//! Error types and result definitions for cdc operations.
//!
//! [`CdcError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, an optional source error, the callsite location and a backtrace. Errors
//! from concurrently merged keys or targets are aggregated into a single [`CdcError`].

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type used throughout the crate.
pub type CdcResult<T> = Result<T, CdcError>;

/// Payload of a single [`CdcError`].
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the crate.
///
/// A [`CdcError`] is either a single error or an aggregation of errors, for example the
/// failures of several keys merged in parallel during one micro-batch.
#[derive(Debug, Clone)]
pub struct CdcError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<CdcError>,
        location: &'static Location<'static>,
    },
}

/// Classification of cdc errors.
///
/// Kinds are grouped by the failure taxonomy the workers act on, see [`ErrorKind::category`].
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration errors, raised before any record is processed.
    ConfigError,
    InvalidRule,
    UnknownColumn,
    InvalidSequenceColumn,
    DuplicateTarget,
    RuleSetChanged,

    // Source errors.
    SourceReadFailed,
    SourceSchemaError,

    // Data errors.
    ConversionError,
    InvalidData,
    ExpectationFailed,

    // Store errors.
    CommitFailed,
    StoreIoError,
    SerializationError,
    DeserializationError,

    // Broken engine invariants, never retried nor repaired.
    InvariantViolation,

    // Workflow errors.
    InvalidState,
    TargetWorkerPanic,
    MergeTaskPanic,

    IoError,

    Unknown,

    // Kinds used by fault injection tests to trigger specific retry behaviors.
    #[cfg(any(test, feature = "failpoints"))]
    WithNoRetry,
    #[cfg(any(test, feature = "failpoints"))]
    WithManualRetry,
    #[cfg(any(test, feature = "failpoints"))]
    WithTimedRetry,
}

/// Coarse error taxonomy used for reporting and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The configuration or rule set is invalid, fails before processing starts.
    Configuration,
    /// A transient failure of the source or the store, retried with backoff.
    Transient,
    /// The engine observed state that must never exist.
    Invariant,
    /// A record violated a rule whose action aborts the run.
    Expectation,
    /// Anything else.
    Other,
}

impl ErrorKind {
    /// Returns the [`ErrorCategory`] of this kind.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorKind::ConfigError
            | ErrorKind::InvalidRule
            | ErrorKind::UnknownColumn
            | ErrorKind::InvalidSequenceColumn
            | ErrorKind::DuplicateTarget
            | ErrorKind::RuleSetChanged
            | ErrorKind::SourceSchemaError => ErrorCategory::Configuration,
            ErrorKind::SourceReadFailed | ErrorKind::CommitFailed | ErrorKind::StoreIoError => {
                ErrorCategory::Transient
            }
            ErrorKind::InvariantViolation => ErrorCategory::Invariant,
            ErrorKind::ExpectationFailed => ErrorCategory::Expectation,
            _ => ErrorCategory::Other,
        }
    }
}

impl CdcError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// Aggregated errors return the kind of their first error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns `true` if any contained error has the given kind.
    pub fn contains(&self, kind: ErrorKind) -> bool {
        self.kinds().contains(&kind)
    }

    /// Returns the static description of the error.
    ///
    /// Aggregated errors return the description of their first error.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.description.as_ref(),
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.description())
                .unwrap_or("no errors"),
        }
    }

    /// Returns the dynamic detail, if any.
    ///
    /// Aggregated errors return the first detail found.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured backtrace of a single error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the location where the error was created.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating error, exposed through [`error::Error::source`].
    ///
    /// Has no effect on aggregated errors.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }

        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        CdcError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for CdcError {
    fn eq(&self, other: &CdcError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for CdcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write_indented(f, "Detail", detail)?;
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_indented(f, "Backtrace", &backtrace)?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

/// Writes a labelled multi-line block indented under the error headline.
fn write_indented(f: &mut fmt::Formatter<'_>, label: &str, body: &str) -> fmt::Result {
    if body.trim().is_empty() {
        return write!(f, "\n  {label}: <empty>");
    }

    write!(f, "\n  {label}:")?;
    for line in body.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl error::Error for CdcError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Creates a [`CdcError`] from a kind and a static description.
impl From<(ErrorKind, &'static str)> for CdcError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> CdcError {
        CdcError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`CdcError`] from a kind, a static description and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for CdcError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> CdcError {
        CdcError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates several errors. A single error is returned unwrapped.
impl<E> From<Vec<E>> for CdcError
where
    E: Into<CdcError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> CdcError {
        let location = Location::caller();
        let mut errors: Vec<CdcError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        CdcError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for CdcError {
    #[track_caller]
    fn from(err: std::io::Error) -> CdcError {
        let detail = err.to_string();
        CdcError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps serde_json failures to serialization or deserialization errors.
impl From<serde_json::Error> for CdcError {
    #[track_caller]
    fn from(err: serde_json::Error) -> CdcError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        CdcError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<chrono::ParseError> for CdcError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> CdcError {
        let detail = err.to_string();
        CdcError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Datetime parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Configuration validation failures are configuration errors.
impl From<config::shared::ValidationError> for CdcError {
    #[track_caller]
    fn from(err: config::shared::ValidationError) -> CdcError {
        let detail = err.to_string();
        CdcError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid configuration"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdc_error;

    #[test]
    fn single_error_keeps_kind_and_detail() {
        let err = cdc_error!(
            ErrorKind::UnknownColumn,
            "Rule references an unknown column",
            "column `emial`"
        );

        assert_eq!(err.kind(), ErrorKind::UnknownColumn);
        assert_eq!(err.detail(), Some("column `emial`"));
        assert_eq!(err.kind().category(), ErrorCategory::Configuration);
        assert!(err.to_string().contains("Rule references an unknown column"));
    }

    #[test]
    fn aggregation_flattens_kinds() {
        let err: CdcError = vec![
            CdcError::from((ErrorKind::CommitFailed, "commit failed")),
            CdcError::from((ErrorKind::InvariantViolation, "overlap")),
        ]
        .into();

        assert_eq!(err.kind(), ErrorKind::CommitFailed);
        assert!(err.contains(ErrorKind::InvariantViolation));
        assert!(err.to_string().starts_with("[Many] 2 errors"));
    }

    #[test]
    fn aggregation_of_one_error_unwraps_it() {
        let err: CdcError = vec![CdcError::from((ErrorKind::InvalidData, "bad"))].into();

        assert!(err.backtrace().is_some());
        assert_eq!(err.kinds(), vec![ErrorKind::InvalidData]);
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err = CdcError::from(std::io::Error::other("disk on fire"));

        assert_eq!(err.kind(), ErrorKind::IoError);
        assert!(error::Error::source(&err).is_some());
    }
}
