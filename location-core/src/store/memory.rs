use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::store::{EventLog, HistoryStore, StoreResult, WriteBatch};
use crate::types::{EventId, LocationEvent, LocationHistory, StoredEvent};

/// A capped log: appending to a full log evicts its oldest entry.
#[derive(Debug)]
struct EventRing {
    capacity: usize,
    next_id: EventId,
    events: VecDeque<StoredEvent>,
    keys: HashSet<(String, i64)>,
}

impl EventRing {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_id: 1,
            events: VecDeque::with_capacity(capacity),
            keys: HashSet::with_capacity(capacity),
        }
    }

    fn push(&mut self, event: LocationEvent) -> StoreResult<EventId> {
        let key = (event.vehicle_id.clone(), event.timestamp_ms);
        if self.keys.contains(&key) {
            return Err(StoreError::DuplicateKey {
                vehicle_id: key.0,
                timestamp_ms: key.1,
            });
        }

        while self.events.len() >= self.capacity {
            match self.events.pop_front() {
                Some(evicted) => self.forget(&evicted),
                None => break,
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.keys.insert(key);
        self.events.push_back(StoredEvent { id, event });

        Ok(id)
    }

    fn forget(&mut self, stored: &StoredEvent) {
        self.keys
            .remove(&(stored.event.vehicle_id.clone(), stored.event.timestamp_ms));
    }

    fn delete_up_to(&mut self, watermark: EventId) -> u64 {
        let mut deleted = 0;
        // Identifiers are assigned in order, so everything to delete sits at the front.
        while self.events.front().is_some_and(|e| e.id <= watermark) {
            if let Some(stored) = self.events.pop_front() {
                self.forget(&stored);
                deleted += 1;
            }
        }
        deleted
    }
}

/// An embedded storage engine keeping both collections in memory.
pub struct MemoryStore {
    events: Mutex<EventRing>,
    histories: Mutex<HashMap<String, Vec<LocationHistory>>>,
    commits: AtomicU64,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(EventRing::new(capacity.max(1))),
            histories: Mutex::new(HashMap::new()),
            commits: AtomicU64::new(0),
        }
    }

    /// Number of history batches committed so far.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventLog for MemoryStore {
    async fn append(&self, event: LocationEvent) -> StoreResult<EventId> {
        self.events.lock().await.push(event)
    }

    async fn list_pending(&self) -> StoreResult<Vec<StoredEvent>> {
        Ok(self.events.lock().await.events.iter().cloned().collect())
    }

    async fn delete_up_to(&self, watermark: EventId) -> StoreResult<u64> {
        Ok(self.events.lock().await.delete_up_to(watermark))
    }

    async fn pending_count(&self) -> StoreResult<usize> {
        Ok(self.events.lock().await.events.len())
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn latest_history(&self, vehicle_id: &str) -> StoreResult<Option<LocationHistory>> {
        let histories = self.histories.lock().await;

        Ok(histories
            .get(vehicle_id)
            .and_then(|records| records.iter().max_by_key(|h| h.end_time))
            .cloned())
    }

    async fn histories(&self, vehicle_id: &str) -> StoreResult<Vec<LocationHistory>> {
        let histories = self.histories.lock().await;

        let mut records = histories.get(vehicle_id).cloned().unwrap_or_default();
        records.sort_by_key(|h| h.start_time);

        Ok(records)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Err(StoreError::EmptyBatch);
        }

        let mut histories = self.histories.lock().await;

        // Check every update before touching anything, so a conflict leaves no partial writes.
        let mut positions = Vec::with_capacity(batch.updates.len());
        for update in &batch.updates {
            let position = histories
                .get(&update.history.vehicle_id)
                .and_then(|records| {
                    records.iter().position(|h| {
                        h.id == update.history.id && h.end_time == update.expected_end_time
                    })
                })
                .ok_or(StoreError::Conflict(update.history.id))?;
            positions.push(position);
        }

        for (update, position) in batch.updates.into_iter().zip(positions) {
            if let Some(records) = histories.get_mut(&update.history.vehicle_id) {
                records[position] = update.history;
            }
        }

        for history in batch.inserts {
            histories
                .entry(history.vehicle_id.clone())
                .or_default()
                .push(history);
        }

        self.commits.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }
}
