use std::collections::BTreeMap;
use tracing::warn;

use crate::merge::engine::MergeSettings;
use crate::merge::stats::MergeStats;
use crate::sequencer::SequencedChange;
use crate::types::{BusinessKey, Cell, ChangeOperation, SequenceValue, TargetRow, VersionChain};

/// Entry of the timeline of a key: a version starting at its sequence or a deletion.
#[derive(Debug, Clone, PartialEq)]
enum Event {
    Version(Vec<Cell>),
    Tombstone,
}

type Timeline = BTreeMap<SequenceValue, Event>;

/// Merges changes into the full history of the key.
///
/// The chain is turned into a timeline of versions and tombstones, changes are placed at their
/// sequence, and effective ranges are derived again from the timeline: every version ends where
/// the next event starts.
pub(crate) fn merge(
    key: &BusinessKey,
    changes: &[SequencedChange],
    chain: &VersionChain,
    settings: &MergeSettings,
) -> (VersionChain, MergeStats) {
    let mut timeline: Timeline = chain
        .rows()
        .iter()
        .map(|row| (row.effective_from.clone(), Event::Version(row.values.clone())))
        .collect();
    for tombstone in chain.tombstones() {
        timeline.insert(tombstone.clone(), Event::Tombstone);
    }

    let mut stats = MergeStats::default();
    for change in changes {
        match change.operation {
            ChangeOperation::Upsert => upsert(key, &mut timeline, change, settings, &mut stats),
            ChangeOperation::Delete => delete(key, &mut timeline, change, &mut stats),
        }
    }

    (into_chain(key, timeline), stats)
}

fn upsert(
    key: &BusinessKey,
    timeline: &mut Timeline,
    change: &SequencedChange,
    settings: &MergeSettings,
    stats: &mut MergeStats,
) {
    let mut values = change.values.clone();

    if settings.ignore_null_updates {
        if let Some((_, Event::Version(previous))) = timeline.range(..&change.sequence).next_back()
        {
            settings.fill_nulls(&mut values, previous);
        }
    }

    // Compare against the version effective at the change's sequence.
    let effective = timeline
        .range_mut(..=&change.sequence)
        .next_back()
        .and_then(|(_, event)| match event {
            Event::Version(current) => Some(current),
            Event::Tombstone => None,
        });

    if let Some(current) = effective {
        match settings.differences(current, &values) {
            (false, false) => {
                stats.noops += 1;
                return;
            }
            (false, true) => {
                settings.copy_excluded(current, &values);
                stats.in_place_corrections += 1;
                return;
            }
            _ => {}
        }
    }

    let latest = timeline
        .last_key_value()
        .map(|(sequence, event)| (sequence.clone(), matches!(event, Event::Version(_))));
    let replaced = timeline.insert(change.sequence.clone(), Event::Version(values));

    match latest {
        Some((latest, _)) if change.sequence <= latest => {
            warn!(
                %key,
                sequence = %change.sequence,
                latest = %latest,
                offset = change.offset,
                "placed late change inside the history"
            );
            stats.late_corrections += 1;
            if replaced.is_none() {
                stats.versions_opened += 1;
            }
        }
        Some((_, closes_current)) => {
            stats.versions_opened += 1;
            if closes_current {
                stats.versions_closed += 1;
            }
        }
        None => stats.versions_opened += 1,
    }
}

fn delete(
    key: &BusinessKey,
    timeline: &mut Timeline,
    change: &SequencedChange,
    stats: &mut MergeStats,
) {
    if timeline.get(&change.sequence) == Some(&Event::Tombstone) {
        stats.noops += 1;
        return;
    }

    let latest = timeline
        .last_key_value()
        .map(|(sequence, event)| (sequence.clone(), matches!(event, Event::Version(_))));
    timeline.insert(change.sequence.clone(), Event::Tombstone);
    stats.deletes += 1;

    match latest {
        Some((latest, _)) if change.sequence <= latest => {
            warn!(
                %key,
                sequence = %change.sequence,
                latest = %latest,
                offset = change.offset,
                "placed late delete inside the history"
            );
            stats.late_corrections += 1;
        }
        Some((_, true)) => stats.versions_closed += 1,
        _ => {}
    }
}

fn into_chain(key: &BusinessKey, timeline: Timeline) -> VersionChain {
    let events: Vec<(SequenceValue, Event)> = timeline.into_iter().collect();
    let mut rows = Vec::new();
    let mut tombstones = Vec::new();

    for (index, (sequence, event)) in events.iter().enumerate() {
        match event {
            Event::Version(values) => {
                let effective_to = events.get(index + 1).map(|(next, _)| next.clone());
                rows.push(TargetRow {
                    key: key.clone(),
                    values: values.clone(),
                    effective_from: sequence.clone(),
                    is_current: effective_to.is_none(),
                    effective_to,
                });
            }
            Event::Tombstone => tombstones.push(sequence.clone()),
        }
    }

    VersionChain::new(rows, tombstones)
}
