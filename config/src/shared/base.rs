use thiserror::Error;

/// Configuration validation errors.
///
/// These are the checks that can be performed without knowing the source schema. Column
/// existence and type checks happen when a target is registered against its source.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A target has an empty name.
    #[error("target name cannot be empty")]
    EmptyTargetName,
    /// A target has no source.
    #[error("target `{0}` has no source")]
    EmptySource(String),
    /// Two targets share the same name.
    #[error("target `{0}` is declared more than once")]
    DuplicateTargetName(String),
    /// A target declares no key columns.
    #[error("target `{0}` must declare at least one key column")]
    MissingKeys(String),
    /// A key column is listed more than once.
    #[error("target `{target}` lists key column `{column}` more than once")]
    DuplicateKeyColumn { target: String, column: String },
    /// The sequencing column is empty.
    #[error("target `{0}` must declare a `sequence_by` column")]
    MissingSequenceColumn(String),
    /// The sequencing column is also a key column.
    #[error("target `{target}` uses key column `{column}` as its sequencing column")]
    SequenceColumnIsKey { target: String, column: String },
    /// The history exclusion list names a key or the sequencing column.
    #[error(
        "target `{target}` cannot exclude `{column}` from history tracking because it is a key or the sequencing column"
    )]
    ExclusionConflict { target: String, column: String },
    /// The projection drops a key or the sequencing column.
    #[error(
        "target `{target}` cannot drop `{column}` from the target because it is a key or the sequencing column"
    )]
    ProjectionConflict { target: String, column: String },
    /// A history exclusion is set on a latest-state target.
    #[error("target `{0}` sets `track_history_except_column_list` but does not keep history")]
    ExclusionWithoutHistory(String),
    /// An expectation has an empty name.
    #[error("target `{0}` has an expectation without a name")]
    EmptyExpectationName(String),
    /// An expectation has an empty constraint.
    #[error("expectation `{name}` of target `{target}` has an empty constraint")]
    EmptyExpectationConstraint { target: String, name: String },
    /// Two expectations of one target share a name.
    #[error("target `{target}` declares expectation `{name}` more than once")]
    DuplicateExpectationName { target: String, name: String },
    /// A numeric field holds an invalid value.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
