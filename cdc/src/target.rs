//! Registration of auto-CDC targets.
//!
//! [`register_target`] turns a declarative [`TargetConfig`] and the schema of its source into a
//! [`RegisteredTarget`] holding everything a worker needs: the validator, the column layout
//! used by the sequencer and the merge settings. Every configuration error surfaces here,
//! before any record is read.

use config::shared::TargetConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::merge::MergeSettings;
use crate::sequencer::SequencingLayout;
use crate::types::{TableSchema, TargetMetadata, Watermark};
use crate::validation::{Predicate, ValidationRule, Validator, parse_expression};

/// A target resolved against its source schema.
#[derive(Debug, Clone)]
pub struct RegisteredTarget {
    config: TargetConfig,
    source_schema: TableSchema,
    target_schema: TableSchema,
    validator: Validator,
    layout: SequencingLayout,
    merge_settings: MergeSettings,
    rule_signature: String,
}

impl RegisteredTarget {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    pub fn source_schema(&self) -> &TableSchema {
        &self.source_schema
    }

    /// Schema of the target rows: the source columns minus `except_column_list`.
    pub fn target_schema(&self) -> &TableSchema {
        &self.target_schema
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn layout(&self) -> &SequencingLayout {
        &self.layout
    }

    pub fn merge_settings(&self) -> &MergeSettings {
        &self.merge_settings
    }

    /// Canonical rendering of the rules, stored with the target to detect rule set changes.
    pub fn rule_signature(&self) -> &str {
        &self.rule_signature
    }

    /// Builds the metadata stored for this target.
    pub fn metadata(&self, watermark: Watermark) -> TargetMetadata {
        TargetMetadata {
            target: self.config.name.clone(),
            history_mode: self.config.history_mode,
            keys: self.config.keys.clone(),
            sequence_by: self.config.sequence_by.clone(),
            rule_signature: self.rule_signature.clone(),
            watermark,
        }
    }

    /// Checks that the target can continue from metadata stored by a previous run.
    ///
    /// A changed rule set fails with [`ErrorKind::RuleSetChanged`], a changed key, sequence or
    /// history mode fails with [`ErrorKind::ConfigError`].
    pub fn check_metadata(&self, stored: &TargetMetadata) -> CdcResult<()> {
        if stored.history_mode != self.config.history_mode
            || stored.keys != self.config.keys
            || stored.sequence_by != self.config.sequence_by
        {
            bail!(
                ErrorKind::ConfigError,
                "Target layout changed",
                format!(
                    "Target '{}' was created as {} keyed by {:?} and sequenced by '{}', run a full refresh to change it",
                    stored.target, stored.history_mode, stored.keys, stored.sequence_by
                )
            );
        }

        if stored.rule_signature != self.rule_signature {
            bail!(
                ErrorKind::RuleSetChanged,
                "Target rules changed",
                format!(
                    "The rules of target '{}' differ from the rules it was created with, run a full refresh to change them",
                    stored.target
                )
            );
        }

        Ok(())
    }
}

/// Resolves `config` against the schema of its source.
pub fn register_target(config: TargetConfig, source_schema: &TableSchema) -> CdcResult<RegisteredTarget> {
    config.validate()?;

    let column_index = |column: &str| -> CdcResult<usize> {
        match source_schema.column_index(column) {
            Some(index) => Ok(index),
            None => bail!(
                ErrorKind::UnknownColumn,
                "Target references an unknown column",
                format!(
                    "Column `{column}` of target '{}' does not exist in source '{}'",
                    config.name, source_schema.name
                )
            ),
        }
    };

    let key_indices = config
        .keys
        .iter()
        .map(|key| column_index(key))
        .collect::<CdcResult<Vec<_>>>()?;

    for (key, &index) in config.keys.iter().zip(&key_indices) {
        let key_type = source_schema.column_schemas[index].typ;
        if !key_type.can_key() {
            bail!(
                ErrorKind::ConfigError,
                "Key column cannot identify rows",
                format!(
                    "Column `{key}` of type {key_type} cannot be a key of target '{}'",
                    config.name
                )
            );
        }
    }

    let sequence_source_index = column_index(&config.sequence_by)?;
    let sequence_type = source_schema.column_schemas[sequence_source_index].typ;
    if !sequence_type.can_sequence() {
        bail!(
            ErrorKind::InvalidSequenceColumn,
            "Sequence column has no total order",
            format!(
                "Column `{}` of type {sequence_type} cannot sequence target '{}'",
                config.sequence_by, config.name
            )
        );
    }

    for column in config
        .except_column_list
        .iter()
        .chain(&config.track_history_except_column_list)
    {
        column_index(column)?;
    }

    let projection: Vec<usize> = source_schema
        .column_schemas
        .iter()
        .enumerate()
        .filter(|(_, column)| !config.except_column_list.contains(&column.name))
        .map(|(index, _)| index)
        .collect();
    let target_schema = TableSchema::new(
        config.name.clone(),
        projection
            .iter()
            .map(|&index| source_schema.column_schemas[index].clone())
            .collect(),
    );

    let Some(sequence_index) = target_schema.column_index(&config.sequence_by) else {
        bail!(
            ErrorKind::InvalidState,
            "Sequence column was projected away",
            format!("Target '{}' lost column `{}`", config.name, config.sequence_by)
        );
    };
    let excluded = target_schema
        .column_schemas
        .iter()
        .map(|column| config.track_history_except_column_list.contains(&column.name))
        .collect();

    let rules = config
        .expectations
        .iter()
        .map(|expectation| ValidationRule::compile(expectation, source_schema))
        .collect::<CdcResult<Vec<_>>>()?;

    let (deletes, deletes_signature) = match &config.apply_as_deletes {
        Some(constraint) => {
            let expression = parse_expression(constraint)?;
            let predicate = Predicate::compile(&expression, source_schema)?;
            (Some(predicate), Some(format!("apply_as_deletes:{expression}")))
        }
        None => (None, None),
    };

    let rule_signature = rules
        .iter()
        .map(ValidationRule::signature)
        .chain(deletes_signature)
        .collect::<Vec<_>>()
        .join("\n");

    let merge_settings = MergeSettings {
        mode: config.history_mode,
        sequence_index,
        excluded,
        ignore_null_updates: config.ignore_null_updates,
    };

    let layout = SequencingLayout {
        key_indices,
        sequence_index: sequence_source_index,
        projection,
    };

    info!(
        target_name = %config.name,
        source = %config.source,
        history_mode = %config.history_mode,
        rules = rules.len(),
        "registered target"
    );

    Ok(RegisteredTarget {
        validator: Validator::new(rules, deletes),
        source_schema: source_schema.clone(),
        target_schema,
        layout,
        merge_settings,
        rule_signature,
        config,
    })
}

/// Registered targets of a pipeline, by name.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: Vec<Arc<RegisteredTarget>>,
    by_name: HashMap<String, usize>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a target, rejecting a second target with the same name.
    pub fn register(
        &mut self,
        config: TargetConfig,
        source_schema: &TableSchema,
    ) -> CdcResult<Arc<RegisteredTarget>> {
        if self.by_name.contains_key(&config.name) {
            bail!(
                ErrorKind::DuplicateTarget,
                "Target registered twice",
                format!("A target named '{}' is already registered", config.name)
            );
        }

        let target = Arc::new(register_target(config, source_schema)?);
        self.by_name
            .insert(target.name().to_string(), self.targets.len());
        self.targets.push(target.clone());

        Ok(target)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RegisteredTarget>> {
        self.by_name.get(name).map(|&index| &self.targets[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RegisteredTarget>> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnSchema, ColumnType};
    use config::shared::{ExpectationAction, ExpectationConfig, HistoryMode};

    fn schema() -> TableSchema {
        TableSchema::new(
            "dimuser_stg",
            vec![
                ColumnSchema::new("user_id", ColumnType::I64, true),
                ColumnSchema::new("email", ColumnType::String, true),
                ColumnSchema::new("last_login", ColumnType::Timestamp, true),
                ColumnSchema::new("updated_at", ColumnType::Timestamp, false),
                ColumnSchema::new("score", ColumnType::F64, true),
            ],
        )
    }

    fn config() -> TargetConfig {
        TargetConfig {
            name: "dimuser".to_string(),
            source: "dimuser_stg".to_string(),
            keys: vec!["user_id".to_string()],
            sequence_by: "updated_at".to_string(),
            history_mode: HistoryMode::FullHistory,
            track_history_except_column_list: vec!["last_login".to_string()],
            except_column_list: vec!["score".to_string()],
            expectations: vec![ExpectationConfig {
                name: "rule_1".to_string(),
                constraint: "user_id IS NOT NULL".to_string(),
                action: ExpectationAction::Drop,
            }],
            apply_as_deletes: None,
            ignore_null_updates: false,
            once: true,
            full_refresh: false,
        }
    }

    #[test]
    fn resolves_layout() {
        let target = register_target(config(), &schema()).unwrap();

        assert_eq!(target.layout().key_indices, vec![0]);
        assert_eq!(target.layout().sequence_index, 3);
        assert_eq!(target.layout().projection, vec![0, 1, 2, 3]);
        assert_eq!(target.target_schema().len(), 4);
        assert_eq!(target.merge_settings().sequence_index, 3);
        assert_eq!(
            target.merge_settings().excluded,
            vec![false, false, true, false]
        );
        assert_eq!(
            target.rule_signature(),
            "rule_1:drop:(`user_id` IS NOT NULL)"
        );
    }

    #[test]
    fn float_sequence_is_rejected() {
        let mut config = config();
        config.sequence_by = "score".to_string();
        config.except_column_list.clear();

        let err = register_target(config, &schema()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSequenceColumn);
    }

    #[test]
    fn float_key_is_rejected() {
        let mut config = config();
        config.keys = vec!["user_id".to_string(), "score".to_string()];
        config.except_column_list.clear();

        let err = register_target(config, &schema()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn unknown_columns_are_rejected() {
        let mut config = config();
        config.keys = vec!["id".to_string()];
        assert_eq!(
            register_target(config, &schema()).unwrap_err().kind(),
            ErrorKind::UnknownColumn
        );

        let mut config = self::config();
        config.expectations[0].constraint = "emial IS NOT NULL".to_string();
        assert_eq!(
            register_target(config, &schema()).unwrap_err().kind(),
            ErrorKind::UnknownColumn
        );
    }

    #[test]
    fn schema_free_checks_are_config_errors() {
        let mut config = config();
        config.keys.clear();

        assert_eq!(
            register_target(config, &schema()).unwrap_err().kind(),
            ErrorKind::ConfigError
        );
    }

    #[test]
    fn changed_rules_are_detected() {
        let target = register_target(config(), &schema()).unwrap();
        let stored = target.metadata(Watermark::default());
        assert!(target.check_metadata(&stored).is_ok());

        let mut changed = config();
        changed.expectations[0].action = ExpectationAction::Warn;
        let changed = register_target(changed, &schema()).unwrap();

        assert_eq!(
            changed.check_metadata(&stored).unwrap_err().kind(),
            ErrorKind::RuleSetChanged
        );
    }

    #[test]
    fn registry_rejects_duplicates() {
        let mut registry = TargetRegistry::new();
        registry.register(config(), &schema()).unwrap();

        let err = registry.register(config(), &schema()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateTarget);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("dimuser").is_some());
    }
}
