use std::sync::Arc;

use tracing::{info, warn};

use location_core::history::HistoryMerger;
use location_core::store::{EventLog, HistoryStore};
use location_core::{ConsolidationError, ConsolidationPipeline, PassOutcome};

use crate::metrics_constants::*;

/// Drives consolidation passes against a pair of stores.
pub struct Janitor {
    pipeline: ConsolidationPipeline,
    events: Arc<dyn EventLog>,
}

impl Janitor {
    pub fn new(
        events: Arc<dyn EventLog>,
        histories: Arc<dyn HistoryStore>,
        history_page_size: usize,
    ) -> Self {
        Self {
            pipeline: ConsolidationPipeline::new(
                events.clone(),
                histories,
                HistoryMerger::new(history_page_size),
            ),
            events,
        }
    }

    pub async fn run_once(&self) -> Result<PassOutcome, ConsolidationError> {
        info!("Running consolidation pass");
        metrics::counter!(LOOP_TICKS).increment(1);

        // Failed passes are already counted by the pipeline itself.
        let outcome = self.pipeline.run().await;

        // Failing to read the depth shouldn't hide the outcome of the pass.
        match self.events.pending_count().await {
            Ok(depth) => metrics::gauge!(RAW_LOG_DEPTH).set(depth as f64),
            Err(e) => warn!("failed to read raw log depth: {}", e),
        }

        outcome
    }
}
