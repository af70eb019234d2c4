use config::shared::HistoryMode;
use serde::{Deserialize, Serialize};

use crate::types::SequenceValue;

/// Progress of a target over its source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    /// Offset of the next source record to read.
    pub next_offset: u64,
    /// Highest sequence value committed so far.
    pub max_sequence: Option<SequenceValue>,
}

impl Watermark {
    /// Returns a watermark moved past `next_offset` and `sequence`.
    ///
    /// Neither component ever moves backwards.
    pub fn advance(&self, next_offset: u64, sequence: Option<&SequenceValue>) -> Watermark {
        let max_sequence = match (&self.max_sequence, sequence) {
            (Some(current), Some(new)) if new > current => Some(new.clone()),
            (None, Some(new)) => Some(new.clone()),
            (current, _) => current.clone(),
        };

        Watermark {
            next_offset: self.next_offset.max(next_offset),
            max_sequence,
        }
    }
}

/// Per-target record kept by a store next to the rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMetadata {
    pub target: String,
    pub history_mode: HistoryMode,
    pub keys: Vec<String>,
    pub sequence_by: String,
    /// Canonical rendering of the rules the target was created with.
    pub rule_signature: String,
    pub watermark: Watermark,
}
