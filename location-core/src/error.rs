use thiserror::Error;

use crate::types::EventId;

/// Errors raised while decoding a packed coordinate pair.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RangeError {
    #[error("bias index {index} is outside of [0, {max}]")]
    IndexOutOfRange { index: u32, max: u32 },
    #[error("latitude {0} is outside of [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} is outside of [-180, 180]")]
    Longitude(f64),
    #[error("coordinate (0, 0) is not accepted")]
    NullIsland,
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("invalid coordinate: {0}")]
    Range(#[from] RangeError),
    #[error("failed to encode record: {0}")]
    Serialize(#[from] rmp_serde::encode::Error),
}

/// Enumeration of reasons a raw ingest buffer is rejected.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("buffer does not start with the expected record header")]
    MalformedHeader,
    #[error("failed to decode record: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("record holds an empty vehicle id")]
    MissingVehicleId,
    #[error("record holds no timestamp")]
    MissingTimestamp,
    #[error("invalid coordinate: {0}")]
    Range(#[from] RangeError),
}

/// Errors surfaced by a storage engine.
/// Backend errors are wrapped to provide the operation that failed.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("an event for vehicle {vehicle_id} at {timestamp_ms} already exists")]
    DuplicateKey {
        vehicle_id: String,
        timestamp_ms: i64,
    },
    #[error("batch holds no operations")]
    EmptyBatch,
    #[error("history {0} was modified concurrently")]
    Conflict(uuid::Uuid),
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("failed to run migrations: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("stored value is corrupt: {0}")]
    Corrupt(String),
}

/// Reasons a single ingest is rejected.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("event timestamp {timestamp_ms} is not within {window_ms}ms of the current time")]
    Stale { timestamp_ms: i64, window_ms: i64 },
    #[error("duplicate event for vehicle {vehicle_id} at {timestamp_ms}")]
    Duplicate {
        vehicle_id: String,
        timestamp_ms: i64,
    },
    #[error("failed to store event: {0}")]
    Store(StoreError),
}

impl From<StoreError> for IngestError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::DuplicateKey {
                vehicle_id,
                timestamp_ms,
            } => IngestError::Duplicate {
                vehicle_id,
                timestamp_ms,
            },
            other => IngestError::Store(other),
        }
    }
}

/// Errors that abort a consolidation pass.
/// None of them truncate the raw log: pending events stay for the next pass.
#[derive(Error, Debug)]
pub enum ConsolidationError {
    #[error("failed to read pending events: {0}")]
    Read(StoreError),
    #[error("failed to look up history for vehicle {vehicle_id}: {error}")]
    Lookup {
        vehicle_id: String,
        error: StoreError,
    },
    #[error("failed to write histories: {0}")]
    Write(StoreError),
    #[error("failed to truncate raw events up to {watermark}: {error}")]
    Truncate {
        watermark: EventId,
        error: StoreError,
    },
}
