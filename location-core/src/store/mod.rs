//! Storage boundary for the consolidation pipeline.
//!
//! The pipeline needs very little from a datastore:
//!   - a capacity bounded, append-only log with uniqueness on (vehicle id, timestamp),
//!   - grouping of that log per vehicle,
//!   - atomic execution of a batch of history inserts and updates,
//!   - deletion of log entries up to an identifier.
//!
//! `EventLog` and `HistoryStore` expose exactly those, so any engine that can provide them
//! (embedded or networked) can back the service.
use async_trait::async_trait;

use crate::aggregator::group_by_vehicle;
use crate::error::StoreError;
use crate::types::{EventId, LocationEvent, LocationHistory, StoredEvent, VehicleBatch};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The raw event log.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append an event, evicting the oldest entries if the log is full.
    /// Fails with `StoreError::DuplicateKey` if (vehicle id, timestamp) is already present.
    async fn append(&self, event: LocationEvent) -> StoreResult<EventId>;

    /// All events currently held, in identifier order.
    async fn list_pending(&self) -> StoreResult<Vec<StoredEvent>>;

    /// Pending events grouped into one time-ordered batch per vehicle.
    /// Engines that can aggregate natively should override this.
    async fn pending_batches(&self) -> StoreResult<Vec<VehicleBatch>> {
        Ok(group_by_vehicle(self.list_pending().await?))
    }

    /// Remove every event with an identifier lower or equal to `watermark`.
    async fn delete_up_to(&self, watermark: EventId) -> StoreResult<u64>;

    /// Number of events currently held.
    async fn pending_count(&self) -> StoreResult<usize>;
}

/// An update of an existing history, only applied if the stored record still ends at
/// `expected_end_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryUpdate {
    pub history: LocationHistory,
    pub expected_end_time: i64,
}

/// All history writes of a consolidation pass, executed atomically.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WriteBatch {
    pub updates: Vec<HistoryUpdate>,
    pub inserts: Vec<LocationHistory>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.inserts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.updates.len() + self.inserts.len()
    }
}

/// The consolidated history collection.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// The history of a vehicle with the greatest end time, if any.
    async fn latest_history(&self, vehicle_id: &str) -> StoreResult<Option<LocationHistory>>;

    /// All histories of a vehicle, ordered by start time.
    async fn histories(&self, vehicle_id: &str) -> StoreResult<Vec<LocationHistory>>;

    /// Execute every write in the batch, or none of them.
    /// An empty batch is rejected with `StoreError::EmptyBatch`.
    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;
}
