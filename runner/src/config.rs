use anyhow::{Context, bail};
use cdc::store::FileTableStore;
use cdc::types::ColumnSchema;
use config::load::{Config, load_config, load_config_from};
use config::shared::PipelineConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Configuration of the runner binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunnerConfig {
    pub pipeline: PipelineConfig,
    /// Directory holding the target journals.
    pub store_dir: PathBuf,
    /// Journals with more entries than this are compacted when the store is opened.
    #[serde(default = "default_compact_after_entries")]
    pub compact_after_entries: usize,
    /// Newline-delimited JSON files the targets read from.
    pub sources: Vec<SourceConfig>,
}

/// A newline-delimited JSON file of change records.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourceConfig {
    pub name: String,
    pub path: PathBuf,
    pub columns: Vec<ColumnSchema>,
    /// Field holding the operation of a record, `upsert` or `delete`.
    ///
    /// Every record is an upsert when unset.
    #[serde(default)]
    pub operation_field: Option<String>,
}

fn default_compact_after_entries() -> usize {
    FileTableStore::DEFAULT_COMPACT_AFTER_ENTRIES
}

impl Config for RunnerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

impl RunnerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.pipeline
            .validate()
            .context("invalid pipeline configuration")?;

        let mut names = HashSet::new();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                bail!("source '{}' is defined twice", source.name);
            }

            if source.columns.is_empty() {
                bail!("source '{}' has no columns", source.name);
            }
        }

        Ok(())
    }
}

/// Loads and validates the configuration, from `directory` when given.
pub fn load_runner_config(directory: Option<&Path>) -> anyhow::Result<RunnerConfig> {
    let config = match directory {
        Some(directory) => load_config_from::<RunnerConfig>(directory),
        None => load_config::<RunnerConfig>(),
    }
    .context("failed to load the runner configuration")?;

    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_sources_are_rejected() {
        let json = r#"{
            "pipeline": { "id": 1, "targets": [] },
            "store_dir": "data/targets",
            "sources": [
                { "name": "dimdate_stg", "path": "a.jsonl", "columns": [{ "name": "date_key", "typ": "i64" }] },
                { "name": "dimdate_stg", "path": "b.jsonl", "columns": [{ "name": "date_key", "typ": "i64" }] }
            ]
        }"#;
        let config: RunnerConfig = serde_json::from_str(json).unwrap();

        assert!(config.validate().is_err());
    }
}
