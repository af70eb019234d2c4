use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::shared::ValidationError;

/// How a target stores the changes applied to it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMode {
    /// One row per key holding the latest state (SCD type 1).
    LatestState,
    /// Every version of every key with effective ranges (SCD type 2).
    FullHistory,
}

impl HistoryMode {
    /// Returns the slowly changing dimension type matching this mode.
    pub fn scd_type(&self) -> u8 {
        match self {
            HistoryMode::LatestState => 1,
            HistoryMode::FullHistory => 2,
        }
    }
}

impl fmt::Display for HistoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryMode::LatestState => f.write_str("latest_state"),
            HistoryMode::FullHistory => f.write_str("full_history"),
        }
    }
}

/// What happens to a record that violates an expectation.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExpectationAction {
    /// The violation is counted and the record is still merged.
    Warn,
    /// The record is dropped and never reaches the target.
    #[default]
    Drop,
    /// The run is aborted.
    Fail,
}

impl fmt::Display for ExpectationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectationAction::Warn => f.write_str("warn"),
            ExpectationAction::Drop => f.write_str("drop"),
            ExpectationAction::Fail => f.write_str("fail"),
        }
    }
}

/// A named row-level rule, e.g. `user_id IS NOT NULL`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ExpectationConfig {
    /// Rule name reported when the rule is violated.
    pub name: String,
    /// Boolean expression over the source columns.
    pub constraint: String,
    /// Action applied to violating records.
    #[serde(default)]
    pub action: ExpectationAction,
}

/// Declarative definition of one auto-CDC target.
///
/// A target reads change records from `source`, validates them against `expectations`
/// and merges them into the table `name` keyed by `keys` and ordered by `sequence_by`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TargetConfig {
    /// Name of the target table.
    pub name: String,
    /// Name of the source the change records are read from.
    pub source: String,
    /// Business key columns.
    pub keys: Vec<String>,
    /// Column ordering the changes of a key.
    pub sequence_by: String,
    /// Whether the target keeps the latest state or the full history.
    pub history_mode: HistoryMode,
    /// Columns whose changes do not open a new version in full-history targets.
    #[serde(default)]
    pub track_history_except_column_list: Vec<String>,
    /// Source columns that are not written to the target.
    #[serde(default)]
    pub except_column_list: Vec<String>,
    /// Rules applied to every incoming record.
    ///
    /// There is intentionally no default: every target states its rules, an empty list
    /// included.
    pub expectations: Vec<ExpectationConfig>,
    /// Expression marking records that must be applied as deletes.
    #[serde(default)]
    pub apply_as_deletes: Option<String>,
    /// Whether null cells of an update keep the previous value.
    #[serde(default)]
    pub ignore_null_updates: bool,
    /// Whether the target stops once its source is exhausted.
    #[serde(default)]
    pub once: bool,
    /// Whether the target is cleared before the run, resetting its rule set and watermark.
    #[serde(default)]
    pub full_refresh: bool,
}

impl TargetConfig {
    /// Validates the parts of the target that do not depend on the source schema.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyTargetName);
        }

        if self.source.trim().is_empty() {
            return Err(ValidationError::EmptySource(self.name.clone()));
        }

        if self.keys.is_empty() {
            return Err(ValidationError::MissingKeys(self.name.clone()));
        }

        let mut keys = HashSet::with_capacity(self.keys.len());
        for key in &self.keys {
            if !keys.insert(key.as_str()) {
                return Err(ValidationError::DuplicateKeyColumn {
                    target: self.name.clone(),
                    column: key.clone(),
                });
            }
        }

        if self.sequence_by.trim().is_empty() {
            return Err(ValidationError::MissingSequenceColumn(self.name.clone()));
        }

        if keys.contains(self.sequence_by.as_str()) {
            return Err(ValidationError::SequenceColumnIsKey {
                target: self.name.clone(),
                column: self.sequence_by.clone(),
            });
        }

        if self.history_mode == HistoryMode::LatestState
            && !self.track_history_except_column_list.is_empty()
        {
            return Err(ValidationError::ExclusionWithoutHistory(self.name.clone()));
        }

        let is_protected = |column: &String| {
            keys.contains(column.as_str()) || *column == self.sequence_by
        };

        if let Some(column) = self
            .track_history_except_column_list
            .iter()
            .find(|column| is_protected(column))
        {
            return Err(ValidationError::ExclusionConflict {
                target: self.name.clone(),
                column: column.clone(),
            });
        }

        if let Some(column) = self.except_column_list.iter().find(|column| is_protected(column)) {
            return Err(ValidationError::ProjectionConflict {
                target: self.name.clone(),
                column: column.clone(),
            });
        }

        let mut names = HashSet::with_capacity(self.expectations.len());
        for expectation in &self.expectations {
            if expectation.name.trim().is_empty() {
                return Err(ValidationError::EmptyExpectationName(self.name.clone()));
            }

            if expectation.constraint.trim().is_empty() {
                return Err(ValidationError::EmptyExpectationConstraint {
                    target: self.name.clone(),
                    name: expectation.name.clone(),
                });
            }

            if !names.insert(expectation.name.as_str()) {
                return Err(ValidationError::DuplicateExpectationName {
                    target: self.name.clone(),
                    name: expectation.name.clone(),
                });
            }
        }

        Ok(())
    }
}
