use std::sync::Arc;

use tracing::debug;

use crate::codec::validate_and_decode;
use crate::error::IngestError;
use crate::store::EventLog;
use crate::time::TimeSource;
use crate::types::{EventId, LocationEvent};

/// Default maximum distance between an event's timestamp and the time it is ingested at.
pub const STALENESS_WINDOW_MS: i64 = 60_000;
/// Default maximum number of raw events held before the oldest ones are evicted.
pub const RAW_LOG_CAPACITY: usize = 10_000;

/// The ingest side of the raw event log.
pub struct RawEventStore {
    log: Arc<dyn EventLog>,
    timesource: Arc<dyn TimeSource + Send + Sync>,
    staleness_window_ms: i64,
}

impl RawEventStore {
    pub fn new(
        log: Arc<dyn EventLog>,
        timesource: Arc<dyn TimeSource + Send + Sync>,
        staleness_window_ms: i64,
    ) -> Self {
        Self {
            log,
            timesource,
            staleness_window_ms,
        }
    }

    /// Store a validated event.
    /// Unless `force` is set, events too far from the current time are rejected.
    pub async fn insert(&self, event: LocationEvent, force: bool) -> Result<EventId, IngestError> {
        if !force {
            let now = self.timesource.now_ms();
            if now.abs_diff(event.timestamp_ms) > self.staleness_window_ms.unsigned_abs() {
                return Err(IngestError::Stale {
                    timestamp_ms: event.timestamp_ms,
                    window_ms: self.staleness_window_ms,
                });
            }
        }

        // Identifiers are always fresh, uniqueness is on (vehicle id, timestamp).
        let id = self.log.append(event).await?;
        debug!(id, "stored location event");

        Ok(id)
    }

    /// Validate, decode and store a raw wire record.
    pub async fn ingest(&self, buffer: &[u8]) -> Result<EventId, IngestError> {
        let event = validate_and_decode(buffer)?;
        self.insert(event, false).await
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_event;
    use crate::error::ValidationError;
    use crate::store::MemoryStore;
    use crate::time::FixedTime;
    use crate::types::Point;

    const NOW: i64 = 1733510923697;

    fn raw_store() -> RawEventStore {
        RawEventStore::new(
            Arc::new(MemoryStore::new(RAW_LOG_CAPACITY)),
            Arc::new(FixedTime::new(NOW)),
            STALENESS_WINDOW_MS,
        )
    }

    fn event(timestamp_ms: i64) -> LocationEvent {
        LocationEvent::new("e-00-000", timestamp_ms, Point::new(10.0, 50.0))
    }

    #[tokio::test]
    async fn test_insert_accepts_events_within_window() {
        let store = raw_store();

        store.insert(event(NOW), false).await.unwrap();
        store.insert(event(NOW - 60_000), false).await.unwrap();
        store.insert(event(NOW + 60_000), false).await.unwrap();

        assert_eq!(store.log().pending_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_insert_rejects_stale_events() {
        let store = raw_store();

        let err = store.insert(event(NOW - 60_001), false).await.unwrap_err();
        assert!(matches!(err, IngestError::Stale { window_ms: 60_000, .. }));

        let err = store.insert(event(NOW + 120_000), false).await.unwrap_err();
        assert!(matches!(err, IngestError::Stale { .. }));

        assert_eq!(store.log().pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_forced_insert_skips_staleness_check() {
        let store = raw_store();

        store.insert(event(1000), true).await.unwrap();

        assert_eq!(store.log().pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let store = raw_store();

        store.insert(event(NOW), false).await.unwrap();
        let err = store.insert(event(NOW), false).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::Duplicate { timestamp_ms: NOW, .. }
        ));

        store.insert(event(NOW + 1), false).await.unwrap();
        assert_eq!(store.log().pending_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_ingest_decodes_wire_records() {
        let store = raw_store();
        let buffer = encode_event("e-00-042", NOW, 50.0, 10.0).unwrap();

        store.ingest(&buffer).await.unwrap();

        let pending = store.log().list_pending().await.unwrap();
        assert_eq!(pending[0].event.vehicle_id, "e-00-042");
        assert_eq!(pending[0].event.point, Point::new(10.0, 50.0));
    }

    #[tokio::test]
    async fn test_ingest_rejects_malformed_buffer() {
        let store = raw_store();

        let err = store.ingest(b"not a record").await.unwrap_err();

        assert!(matches!(
            err,
            IngestError::Validation(ValidationError::MalformedHeader)
        ));
    }
}
