use config::shared::HistoryMode;

use crate::error::CdcResult;
use crate::merge::stats::MergeStats;
use crate::merge::{history, latest};
use crate::sequencer::SequencedChange;
use crate::types::{BusinessKey, Cell, ChainDelta, VersionChain};

/// Per-target merge behavior, resolved against the target column layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSettings {
    pub mode: HistoryMode,
    /// Position of the sequencing column in the target layout.
    pub sequence_index: usize,
    /// For every target column, whether changes to it do not open a new version.
    pub excluded: Vec<bool>,
    /// Whether null cells of an upsert keep the value of the preceding version.
    pub ignore_null_updates: bool,
}

impl MergeSettings {
    /// Replaces the null cells of `values` with the cells of `previous`.
    pub(crate) fn fill_nulls(&self, values: &mut [Cell], previous: &[Cell]) {
        for (value, previous) in values.iter_mut().zip(previous) {
            if value.is_null() {
                *value = previous.clone();
            }
        }
    }

    /// Compares two versions ignoring the sequencing column.
    ///
    /// Returns whether tracked columns differ and whether excluded columns differ.
    pub(crate) fn differences(&self, a: &[Cell], b: &[Cell]) -> (bool, bool) {
        let mut tracked = a.len() != b.len();
        let mut excluded = false;

        for (index, (a, b)) in a.iter().zip(b).enumerate() {
            if index == self.sequence_index || a == b {
                continue;
            }

            if self.excluded.get(index).copied().unwrap_or(false) {
                excluded = true;
            } else {
                tracked = true;
            }
        }

        (tracked, excluded)
    }

    /// Writes the excluded cells of `source` into `target`.
    pub(crate) fn copy_excluded(&self, target: &mut [Cell], source: &[Cell]) {
        for (index, (target, source)) in target.iter_mut().zip(source).enumerate() {
            if self.excluded.get(index).copied().unwrap_or(false) {
                *target = source.clone();
            }
        }
    }
}

/// Result of merging the changes of one key.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Delta turning the previous chain into `chain`.
    pub delta: ChainDelta,
    /// The chain after the merge.
    pub chain: VersionChain,
    pub stats: MergeStats,
}

/// Merges the ordered `changes` of `key` into `chain`.
///
/// `changes` must be in ascending sequence order with at most one change per sequence, as
/// produced by the sequencer. The resulting chain is checked against the chain invariants.
pub fn apply(
    key: &BusinessKey,
    changes: &[SequencedChange],
    chain: &VersionChain,
    settings: &MergeSettings,
) -> CdcResult<MergeOutcome> {
    let (merged, stats) = match settings.mode {
        HistoryMode::LatestState => latest::merge(key, changes, chain, settings),
        HistoryMode::FullHistory => history::merge(key, changes, chain, settings),
    };

    merged.validate(key)?;
    let delta = ChainDelta::between(key.clone(), chain, &merged);

    Ok(MergeOutcome {
        delta,
        chain: merged,
        stats,
    })
}
