pub mod aggregator;
pub mod codec;
pub mod error;
pub mod history;
pub mod ingest;
pub mod metrics_consts;
pub mod pipeline;
pub mod store;
pub mod time;
pub mod truncate;
pub mod types;

pub use error::{ConsolidationError, IngestError, StoreError, ValidationError};
pub use pipeline::{ConsolidationPipeline, PassOutcome, PassReport};
pub use types::{EventId, LocationEvent, LocationHistory, Point, VehicleBatch};
