//! Merging per-vehicle batches into bounded history records.
use crate::store::{HistoryUpdate, WriteBatch};
use crate::types::{LocationHistory, Point, VehicleBatch};

/// Default maximum number of samples held by a single history record.
pub const MAX_COUNT: usize = 100;

/// A run of consecutive samples of a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chunk<'a> {
    pub timestamps: &'a [i64],
    pub coordinates: &'a [Point],
}

impl<'a> Chunk<'a> {
    pub fn count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn start_time(&self) -> Option<i64> {
        self.timestamps.first().copied()
    }

    pub fn end_time(&self) -> Option<i64> {
        self.timestamps.last().copied()
    }
}

/// Split a batch into chunks holding at most `max_count` samples each, except for the first
/// one which can only hold what's left after `prev_count`.
/// When `prev_count` already fills a record, the first chunk is empty.
pub fn paginate(batch: &VehicleBatch, max_count: usize, prev_count: usize) -> Vec<Chunk<'_>> {
    let max_count = max_count.max(1);
    let total = batch.count();
    let mut available = max_count.saturating_sub(prev_count);

    let slice = |from: usize, to: usize| Chunk {
        timestamps: &batch.timestamps[from..to],
        coordinates: &batch.coordinates[from..to],
    };

    if total <= available {
        return vec![slice(0, total)];
    }

    let mut chunks = Vec::with_capacity(total / max_count + 2);
    let mut used = 0;
    loop {
        let end = (used + available).min(total);
        chunks.push(slice(used, end));
        used = end;
        if used >= total {
            break;
        }
        available = max_count;
    }

    chunks
}

/// What happened to a batch once merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The vehicle had no history, `records` new ones were created.
    Created { records: usize },
    /// `appended` samples went to the latest history, the rest filled `created` new records.
    Extended { appended: usize, created: usize },
    /// The batch starts before the latest history ends and was discarded.
    Dropped,
}

/// Plans history writes so that no record ever exceeds `max_count` samples.
#[derive(Debug, Clone, Copy)]
pub struct HistoryMerger {
    max_count: usize,
}

impl Default for HistoryMerger {
    fn default() -> Self {
        Self::new(MAX_COUNT)
    }
}

impl HistoryMerger {
    pub fn new(max_count: usize) -> Self {
        Self {
            max_count: max_count.max(1),
        }
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Queue into `writes` whatever is needed to record `batch`, given `prev`, the
    /// vehicle's latest history.
    pub fn merge(
        &self,
        batch: &VehicleBatch,
        prev: Option<LocationHistory>,
        writes: &mut WriteBatch,
    ) -> MergeOutcome {
        let Some(mut prev) = prev else {
            let inserts = self.new_records(&batch.vehicle_id, paginate(batch, self.max_count, 0));
            let records = inserts.len();
            writes.inserts.extend(inserts);
            return MergeOutcome::Created { records };
        };

        // Out of order samples are not reconciled with what is already stored.
        if batch.start_time < prev.end_time {
            return MergeOutcome::Dropped;
        }

        let mut chunks = paginate(batch, self.max_count, prev.count).into_iter();
        let mut appended = 0;

        if let Some(first) = chunks.next() {
            if !first.is_empty() {
                let expected_end_time = prev.end_time;
                prev.extend(first.timestamps, first.coordinates);
                appended = first.count();
                writes.updates.push(HistoryUpdate {
                    history: prev,
                    expected_end_time,
                });
            }
        }

        let inserts = self.new_records(&batch.vehicle_id, chunks);
        let created = inserts.len();
        writes.inserts.extend(inserts);

        MergeOutcome::Extended { appended, created }
    }

    fn new_records<'a>(
        &self,
        vehicle_id: &str,
        chunks: impl IntoIterator<Item = Chunk<'a>>,
    ) -> Vec<LocationHistory> {
        chunks
            .into_iter()
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| LocationHistory::from_samples(vehicle_id, chunk.timestamps, chunk.coordinates))
            .collect()
    }
}
