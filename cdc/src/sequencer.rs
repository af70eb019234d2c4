//! Grouping and ordering of admitted records per business key.

use std::collections::HashMap;
use tracing::debug;

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::types::{BusinessKey, Cell, ChangeOperation, ChangeRecord, SequenceValue};

/// Column positions used to turn source records into keyed, ordered changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencingLayout {
    /// Positions of the key columns in the source, in key order.
    pub key_indices: Vec<usize>,
    /// Position of the sequencing column in the source.
    pub sequence_index: usize,
    /// Source position of every target column, in target order.
    pub projection: Vec<usize>,
}

/// One admitted change, projected into the target column layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedChange {
    pub sequence: SequenceValue,
    pub operation: ChangeOperation,
    pub values: Vec<Cell>,
    pub offset: u64,
}

/// The changes of one key in ascending sequence order, at most one per sequence value.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyBatch {
    pub key: BusinessKey,
    pub changes: Vec<SequencedChange>,
}

impl KeyBatch {
    /// Returns the highest sequence in the batch.
    pub fn max_sequence(&self) -> Option<&SequenceValue> {
        self.changes.last().map(|change| &change.sequence)
    }
}

/// Counters of a sequencing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequencerStats {
    pub records: u64,
    pub keys: u64,
    /// Records superseded by a later arrival with the same key and sequence.
    pub ties_resolved: u64,
}

impl SequencerStats {
    pub fn merge(&mut self, other: &SequencerStats) {
        self.records += other.records;
        self.keys += other.keys;
        self.ties_resolved += other.ties_resolved;
    }
}

/// Lazily ordered per-key batches.
///
/// Keys are yielded in the order of their first arrival. The changes of a key are only sorted
/// when its batch is pulled.
#[derive(Debug)]
pub struct SequencedChanges {
    groups: std::vec::IntoIter<(BusinessKey, Vec<SequencedChange>)>,
    stats: SequencerStats,
}

impl SequencedChanges {
    /// Returns the counters accumulated so far.
    ///
    /// `ties_resolved` is only complete once every batch was pulled.
    pub fn stats(&self) -> &SequencerStats {
        &self.stats
    }
}

impl Iterator for SequencedChanges {
    type Item = KeyBatch;

    fn next(&mut self) -> Option<KeyBatch> {
        let (key, mut changes) = self.groups.next()?;

        // Arrival order breaks ties, so the last change of a run of equal sequences wins.
        changes.sort_by(|a, b| {
            a.sequence
                .cmp(&b.sequence)
                .then_with(|| a.offset.cmp(&b.offset))
        });

        let mut ordered: Vec<SequencedChange> = Vec::with_capacity(changes.len());
        for change in changes {
            match ordered.last_mut() {
                Some(last) if last.sequence == change.sequence => {
                    debug!(
                        %key,
                        sequence = %change.sequence,
                        superseded_offset = last.offset,
                        winning_offset = change.offset,
                        "resolved sequence tie by arrival order"
                    );
                    *last = change;
                    self.stats.ties_resolved += 1;
                }
                _ => ordered.push(change),
            }
        }

        Some(KeyBatch {
            key,
            changes: ordered,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.groups.size_hint()
    }
}

/// Groups admitted records by business key.
///
/// Every record is checked before anything is yielded: a null key or a null sequence value
/// fails the whole batch with [`ErrorKind::InvariantViolation`].
pub fn sequence(
    layout: &SequencingLayout,
    records: Vec<ChangeRecord>,
) -> CdcResult<SequencedChanges> {
    let mut positions: HashMap<BusinessKey, usize> = HashMap::new();
    let mut groups: Vec<(BusinessKey, Vec<SequencedChange>)> = Vec::new();
    let records_count = records.len() as u64;

    for record in records {
        let key = BusinessKey::from_row(&record.values, &layout.key_indices);
        if key.has_null() {
            bail!(
                ErrorKind::InvariantViolation,
                "Admitted record has a null business key",
                format!("Record at offset {} has key {key}", record.offset)
            );
        }

        let Some(sequence) = SequenceValue::from_cell(record.value(layout.sequence_index))? else {
            bail!(
                ErrorKind::InvariantViolation,
                "Admitted record has a null sequence value",
                format!("Record at offset {} of key {key} has no sequence", record.offset)
            );
        };

        let values = layout
            .projection
            .iter()
            .map(|&index| record.value(index).clone())
            .collect();

        let change = SequencedChange {
            sequence,
            operation: record.operation,
            values,
            offset: record.offset,
        };

        match positions.get(&key) {
            Some(&position) => groups[position].1.push(change),
            None => {
                positions.insert(key.clone(), groups.len());
                groups.push((key, vec![change]));
            }
        }
    }

    let stats = SequencerStats {
        records: records_count,
        keys: groups.len() as u64,
        ties_resolved: 0,
    };

    Ok(SequencedChanges {
        groups: groups.into_iter(),
        stats,
    })
}
