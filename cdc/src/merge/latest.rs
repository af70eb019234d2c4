use tracing::warn;

use crate::merge::engine::MergeSettings;
use crate::merge::stats::MergeStats;
use crate::sequencer::SequencedChange;
use crate::types::{BusinessKey, Cell, ChangeOperation, SequenceValue, TargetRow, VersionChain};

/// Latest applied change of a key.
enum State {
    Empty,
    Row(SequenceValue, Vec<Cell>),
    Tombstone(SequenceValue),
}

impl State {
    fn from_chain(chain: &VersionChain) -> State {
        let Some(latest) = chain.latest_sequence() else {
            return State::Empty;
        };

        match chain.rows().last() {
            Some(row) if row.effective_from == *latest => {
                State::Row(row.effective_from.clone(), row.values.clone())
            }
            _ => State::Tombstone(latest.clone()),
        }
    }

    fn sequence(&self) -> Option<&SequenceValue> {
        match self {
            State::Empty => None,
            State::Row(sequence, _) | State::Tombstone(sequence) => Some(sequence),
        }
    }

    fn into_chain(self, key: &BusinessKey) -> VersionChain {
        match self {
            State::Empty => VersionChain::default(),
            State::Row(sequence, values) => {
                VersionChain::new(vec![TargetRow::open(key.clone(), values, sequence)], vec![])
            }
            State::Tombstone(sequence) => VersionChain::new(vec![], vec![sequence]),
        }
    }
}

/// Keeps only the latest state of the key.
///
/// Changes older than the latest applied change, row or tombstone, are stale and ignored. A
/// change with the same sequence replaces the latest one.
pub(crate) fn merge(
    key: &BusinessKey,
    changes: &[SequencedChange],
    chain: &VersionChain,
    settings: &MergeSettings,
) -> (VersionChain, MergeStats) {
    let mut state = State::from_chain(chain);
    let mut stats = MergeStats::default();

    for change in changes {
        if let Some(latest) = state.sequence() {
            if change.sequence < *latest {
                warn!(
                    %key,
                    sequence = %change.sequence,
                    latest = %latest,
                    offset = change.offset,
                    "ignored stale change older than the latest applied change"
                );
                stats.stale_ignored += 1;
                continue;
            }
        }

        state = match (change.operation, state) {
            (ChangeOperation::Upsert, State::Row(sequence, current)) => {
                let mut values = change.values.clone();
                if settings.ignore_null_updates {
                    settings.fill_nulls(&mut values, &current);
                }

                if sequence == change.sequence && values == current {
                    stats.noops += 1;
                    State::Row(sequence, current)
                } else {
                    stats.versions_closed += 1;
                    stats.versions_opened += 1;
                    State::Row(change.sequence.clone(), values)
                }
            }
            (ChangeOperation::Upsert, _) => {
                stats.versions_opened += 1;
                State::Row(change.sequence.clone(), change.values.clone())
            }
            (ChangeOperation::Delete, State::Tombstone(sequence)) if sequence == change.sequence => {
                stats.noops += 1;
                State::Tombstone(sequence)
            }
            (ChangeOperation::Delete, previous) => {
                if matches!(previous, State::Row(..)) {
                    stats.versions_closed += 1;
                }
                stats.deletes += 1;
                State::Tombstone(change.sequence.clone())
            }
        };
    }

    (state.into_chain(key), stats)
}
