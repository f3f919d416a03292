use tracing::info;

use crate::error::ConsolidationError;
use crate::store::EventLog;
use crate::types::{EventId, VehicleBatch};

/// The highest raw event identifier that contributed to any of `batches`.
pub fn watermark(batches: &[VehicleBatch]) -> Option<EventId> {
    batches.iter().map(|b| b.max_source_id).max()
}

/// Remove raw events that a completed pass has consolidated.
/// Events newer than the watermark were not part of the pass and are kept.
pub async fn truncate(log: &dyn EventLog, watermark: EventId) -> Result<u64, ConsolidationError> {
    let deleted = log
        .delete_up_to(watermark)
        .await
        .map_err(|error| ConsolidationError::Truncate { watermark, error })?;

    info!(watermark, deleted, "truncated raw events");

    Ok(deleted)
}
