use std::{
    collections::{BTreeMap, HashMap, hash_map::Entry},
    sync::Arc,
};

use crate::{
    RecordSource,
    record::{DedupKey, LogRecord, SortKey},
};

/// What one [`MergeStage::ingest`] call did with its batch.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Records with a key not seen before.
    pub inserted: usize,
    /// Historical copies replaced by a live copy of the same event.
    pub replaced: usize,
    /// Records dropped as duplicates.
    pub dropped: usize,
}

impl MergeReport {
    /// Whether the merged view changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.replaced > 0
    }
}

/// Deduplicating, ordered accumulator of every record a subscription has delivered.
///
/// Keys are remembered for the lifetime of the stage, so an event dropped once stays dropped.
/// Iteration order is descending by `(block_number, log_index)`.
#[derive(Debug)]
pub struct MergeStage<B, T, R> {
    ordered: BTreeMap<SortKey, Arc<LogRecord<B, T, R>>>,
    seen: HashMap<DedupKey, (SortKey, RecordSource)>,
}

impl<B, T, R> Default for MergeStage<B, T, R> {
    fn default() -> Self {
        Self { ordered: BTreeMap::new(), seen: HashMap::new() }
    }
}

impl<B, T, R> MergeStage<B, T, R> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.seen.contains_key(key)
    }

    /// Folds a batch into the merged view.
    ///
    /// A key seen before is dropped, except that a live record replaces a historical copy of the
    /// same event in place.
    pub fn ingest(&mut self, batch: Vec<LogRecord<B, T, R>>) -> MergeReport {
        let mut report = MergeReport::default();

        for record in batch {
            let sort_key = record.sort_key();
            match self.seen.entry(record.dedup_key()) {
                Entry::Vacant(slot) => {
                    slot.insert((sort_key, record.source));
                    self.ordered.insert(sort_key, Arc::new(record));
                    report.inserted += 1;
                }
                Entry::Occupied(mut slot) => {
                    let (existing_key, existing_source) = *slot.get();
                    if existing_source == RecordSource::Historical &&
                        record.source == RecordSource::Live
                    {
                        self.ordered.remove(&existing_key);
                        self.ordered.insert(sort_key, Arc::new(record));
                        slot.insert((sort_key, RecordSource::Live));
                        report.replaced += 1;
                    } else {
                        report.dropped += 1;
                    }
                }
            }
        }

        report
    }

    /// The merged view, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<LogRecord<B, T, R>>> {
        self.ordered.values().cloned().collect()
    }
}
