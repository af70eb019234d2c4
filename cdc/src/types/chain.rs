use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::types::{BusinessKey, SequenceValue, TargetRow};

/// All versions of one key together with the sequences at which the key was deleted.
///
/// Rows are ordered by `effective_from` and never overlap. Only the last row can be current.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionChain {
    rows: Vec<TargetRow>,
    tombstones: Vec<SequenceValue>,
}

impl VersionChain {
    pub fn new(rows: Vec<TargetRow>, tombstones: Vec<SequenceValue>) -> Self {
        Self { rows, tombstones }
    }

    pub fn rows(&self) -> &[TargetRow] {
        &self.rows
    }

    pub fn tombstones(&self) -> &[SequenceValue] {
        &self.tombstones
    }

    pub fn into_rows(self) -> Vec<TargetRow> {
        self.rows
    }

    /// Returns `true` if the chain holds neither rows nor tombstones.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.tombstones.is_empty()
    }

    /// Returns the current row, if the key is visible in the current view.
    pub fn current(&self) -> Option<&TargetRow> {
        self.rows.last().filter(|row| row.is_current)
    }

    /// Returns the row effective at `at`.
    pub fn as_of(&self, at: &SequenceValue) -> Option<&TargetRow> {
        self.rows.iter().find(|row| row.covers(at))
    }

    /// Returns the highest sequence recorded in the chain, row or tombstone.
    pub fn latest_sequence(&self) -> Option<&SequenceValue> {
        let row = self.rows.last().map(|row| &row.effective_from);
        let tombstone = self.tombstones.last();

        row.max(tombstone)
    }

    /// Applies `delta` in place.
    ///
    /// Removals are applied before insertions, so applying the same delta twice yields the
    /// same chain.
    pub fn apply(&mut self, delta: &ChainDelta) {
        let removed: BTreeSet<&SequenceValue> = delta.removed_rows.iter().collect();
        let mut rows: BTreeMap<SequenceValue, TargetRow> = self
            .rows
            .drain(..)
            .filter(|row| !removed.contains(&row.effective_from))
            .map(|row| (row.effective_from.clone(), row))
            .collect();
        for row in &delta.put_rows {
            rows.insert(row.effective_from.clone(), row.clone());
        }
        self.rows = rows.into_values().collect();

        let mut tombstones: BTreeSet<SequenceValue> = self.tombstones.drain(..).collect();
        for tombstone in &delta.removed_tombstones {
            tombstones.remove(tombstone);
        }
        tombstones.extend(delta.put_tombstones.iter().cloned());
        self.tombstones = tombstones.into_iter().collect();
    }

    /// Checks the ordering and currency invariants of the chain of `key`.
    pub fn validate(&self, key: &BusinessKey) -> CdcResult<()> {
        for (index, row) in self.rows.iter().enumerate() {
            if row.key != *key {
                bail!(
                    ErrorKind::InvariantViolation,
                    "Row belongs to another key",
                    format!("Row of key {} found in the chain of key {key}", row.key)
                );
            }

            if row.is_current != row.effective_to.is_none() {
                bail!(
                    ErrorKind::InvariantViolation,
                    "Row currency does not match its effective range",
                    format!(
                        "Row of key {key} starting at {} has is_current = {} and effective_to = {:?}",
                        row.effective_from, row.is_current, row.effective_to
                    )
                );
            }

            if let Some(to) = &row.effective_to {
                if *to <= row.effective_from {
                    bail!(
                        ErrorKind::InvariantViolation,
                        "Row has an empty effective range",
                        format!(
                            "Row of key {key} starts at {} and ends at {to}",
                            row.effective_from
                        )
                    );
                }
            }

            let Some(next) = self.rows.get(index + 1) else {
                continue;
            };

            if next.effective_from <= row.effective_from {
                bail!(
                    ErrorKind::InvariantViolation,
                    "History rows are not ordered",
                    format!(
                        "Row of key {key} starting at {} follows a row starting at {}",
                        next.effective_from, row.effective_from
                    )
                );
            }

            match &row.effective_to {
                Some(to) if *to <= next.effective_from => {}
                Some(to) => {
                    bail!(
                        ErrorKind::InvariantViolation,
                        "History rows overlap",
                        format!(
                            "Row of key {key} ends at {to} after the next row starts at {}",
                            next.effective_from
                        )
                    );
                }
                None => {
                    bail!(
                        ErrorKind::InvariantViolation,
                        "An open row is followed by another row",
                        format!(
                            "Row of key {key} starting at {} is open but not the last row",
                            row.effective_from
                        )
                    );
                }
            }
        }

        if self.tombstones.windows(2).any(|pair| pair[0] >= pair[1]) {
            bail!(
                ErrorKind::InvariantViolation,
                "Tombstones are not ordered",
                format!("Tombstones of key {key} are not strictly ascending")
            );
        }

        Ok(())
    }
}

/// Structural change of one key's chain produced by one merge.
///
/// Rows are identified by their `effective_from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDelta {
    pub key: BusinessKey,
    #[serde(default)]
    pub put_rows: Vec<TargetRow>,
    #[serde(default)]
    pub removed_rows: Vec<SequenceValue>,
    #[serde(default)]
    pub put_tombstones: Vec<SequenceValue>,
    #[serde(default)]
    pub removed_tombstones: Vec<SequenceValue>,
}

impl ChainDelta {
    pub fn empty(key: BusinessKey) -> Self {
        Self {
            key,
            put_rows: vec![],
            removed_rows: vec![],
            put_tombstones: vec![],
            removed_tombstones: vec![],
        }
    }

    /// Computes the delta turning `old` into `new`.
    pub fn between(key: BusinessKey, old: &VersionChain, new: &VersionChain) -> Self {
        let old_rows: BTreeMap<&SequenceValue, &TargetRow> = old
            .rows
            .iter()
            .map(|row| (&row.effective_from, row))
            .collect();
        let new_rows: BTreeMap<&SequenceValue, &TargetRow> = new
            .rows
            .iter()
            .map(|row| (&row.effective_from, row))
            .collect();

        let put_rows = new
            .rows
            .iter()
            .filter(|row| old_rows.get(&row.effective_from).copied() != Some(*row))
            .cloned()
            .collect();
        let removed_rows = old
            .rows
            .iter()
            .filter(|row| !new_rows.contains_key(&row.effective_from))
            .map(|row| row.effective_from.clone())
            .collect();

        let put_tombstones = new
            .tombstones
            .iter()
            .filter(|tombstone| !old.tombstones.contains(tombstone))
            .cloned()
            .collect();
        let removed_tombstones = old
            .tombstones
            .iter()
            .filter(|tombstone| !new.tombstones.contains(tombstone))
            .cloned()
            .collect();

        Self {
            key,
            put_rows,
            removed_rows,
            put_tombstones,
            removed_tombstones,
        }
    }

    /// Returns `true` if applying the delta changes nothing.
    pub fn is_empty(&self) -> bool {
        self.put_rows.is_empty()
            && self.removed_rows.is_empty()
            && self.put_tombstones.is_empty()
            && self.removed_tombstones.is_empty()
    }
}
