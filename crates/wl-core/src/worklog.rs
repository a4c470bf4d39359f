//! Worklog reconciliation: filter, merge and classify fetched entries.

use std::collections::HashMap;

use tracing::debug;

use crate::entry::{Entry, MergeKey};
use crate::filter::FilterOpts;

const NOTE_SEPARATOR: &str = "; ";

/// Merges entries sharing the same [`MergeKey`].
///
/// The first entry seen for a key provides attribution, summary and start.
/// Later entries add their durations and contribute their notes, unless the
/// note is empty or identical to what was already collected. Groups keep the
/// order in which their key first appeared.
pub fn merge(entries: impl IntoIterator<Item = Entry>) -> Vec<Entry> {
    let mut merged: Vec<Entry> = Vec::new();
    let mut index: HashMap<MergeKey, usize> = HashMap::new();

    for entry in entries {
        let key = entry.merge_key();
        let Some(&position) = index.get(&key) else {
            index.insert(key, merged.len());
            merged.push(entry);
            continue;
        };

        let stored = &merged[position];
        let accumulated = Entry {
            billable: stored.billable + entry.billable,
            unbillable: stored.unbillable + entry.unbillable,
            notes: join_notes(&stored.notes, &entry.notes),
            ..stored.clone()
        };
        merged[position] = accumulated;
    }

    merged
}

fn join_notes(stored: &str, incoming: &str) -> String {
    if incoming.is_empty() || incoming == stored {
        stored.to_string()
    } else if stored.is_empty() {
        incoming.to_string()
    } else {
        format!("{stored}{NOTE_SEPARATOR}{incoming}")
    }
}

/// Splits entries into complete and incomplete ones.
pub fn classify(entries: impl IntoIterator<Item = Entry>) -> (Vec<Entry>, Vec<Entry>) {
    entries.into_iter().partition(Entry::is_complete)
}

/// A reconciled set of entries, ready to be reviewed and uploaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Worklog {
    complete: Vec<Entry>,
    incomplete: Vec<Entry>,
}

impl Worklog {
    /// Filters, merges and classifies the given entries.
    pub fn new(entries: impl IntoIterator<Item = Entry>, filters: &FilterOpts) -> Self {
        let mut fetched = 0_usize;
        let filtered = entries
            .into_iter()
            .inspect(|_| fetched += 1)
            .filter(|entry| filters.matches(entry));

        let merged = merge(filtered);
        let (complete, incomplete) = classify(merged);

        debug!(
            fetched,
            complete = complete.len(),
            incomplete = incomplete.len(),
            "reconciled worklog"
        );

        Self {
            complete,
            incomplete,
        }
    }

    /// Entries with every necessary field filled.
    pub fn complete(&self) -> &[Entry] {
        &self.complete
    }

    /// Entries missing attribution, summary, start or time spent.
    pub fn incomplete(&self) -> &[Entry] {
        &self.incomplete
    }

    /// Consumes the worklog, returning `(complete, incomplete)`.
    pub fn into_parts(self) -> (Vec<Entry>, Vec<Entry>) {
        (self.complete, self.incomplete)
    }
}
