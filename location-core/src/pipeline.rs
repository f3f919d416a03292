//! One consolidation pass: group pending events per vehicle, merge them into histories,
//! commit the writes atomically and truncate the raw log up to the watermark.
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::error::{ConsolidationError, StoreError};
use crate::history::{HistoryMerger, MergeOutcome};
use crate::metrics_consts::*;
use crate::store::{EventLog, HistoryStore, WriteBatch};
use crate::truncate::{truncate, watermark};
use crate::types::EventId;

/// What a completed pass did. Mostly for logs, status and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub vehicles: usize,
    pub events: usize,
    pub histories_created: usize,
    pub histories_extended: usize,
    pub batches_dropped: usize,
    pub watermark: Option<EventId>,
    pub events_truncated: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(PassReport),
    /// Another pass was still running.
    Skipped,
}

pub struct ConsolidationPipeline {
    events: Arc<dyn EventLog>,
    histories: Arc<dyn HistoryStore>,
    merger: HistoryMerger,
    in_flight: Semaphore,
}

impl ConsolidationPipeline {
    pub fn new(
        events: Arc<dyn EventLog>,
        histories: Arc<dyn HistoryStore>,
        merger: HistoryMerger,
    ) -> Self {
        Self {
            events,
            histories,
            merger,
            in_flight: Semaphore::new(1),
        }
    }

    /// Run a single pass, unless one is already running.
    #[instrument(skip_all)]
    pub async fn run(&self) -> Result<PassOutcome, ConsolidationError> {
        let Ok(_permit) = self.in_flight.try_acquire() else {
            warn!("consolidation pass already in flight, skipping");
            metrics::counter!(PASS_SKIPPED).increment(1);
            return Ok(PassOutcome::Skipped);
        };

        metrics::counter!(PASS_STARTS).increment(1);
        let start = Instant::now();

        let result = self.run_pass().await;

        metrics::histogram!(PASS_TIME).record(start.elapsed().as_secs_f64());
        match result {
            Ok(report) => {
                metrics::counter!(PASS_ENDS).increment(1);
                Ok(PassOutcome::Completed(report))
            }
            Err(error) => {
                metrics::counter!(PASS_FAILURES).increment(1);
                Err(error)
            }
        }
    }

    async fn run_pass(&self) -> Result<PassReport, ConsolidationError> {
        let batches = self
            .events
            .pending_batches()
            .await
            .map_err(ConsolidationError::Read)?;

        if batches.is_empty() {
            debug!("no pending events");
            return Ok(PassReport::default());
        }

        let mut report = PassReport {
            vehicles: batches.len(),
            events: batches.iter().map(|b| b.count()).sum(),
            ..Default::default()
        };
        let mut writes = WriteBatch::default();

        for batch in &batches {
            let prev = self
                .histories
                .latest_history(&batch.vehicle_id)
                .await
                .map_err(|error| ConsolidationError::Lookup {
                    vehicle_id: batch.vehicle_id.clone(),
                    error,
                })?;

            match self.merger.merge(batch, prev, &mut writes) {
                MergeOutcome::Created { records } => report.histories_created += records,
                MergeOutcome::Extended { appended, created } => {
                    if appended > 0 {
                        report.histories_extended += 1;
                    }
                    report.histories_created += created;
                }
                MergeOutcome::Dropped => {
                    warn!(
                        vehicle_id = batch.vehicle_id,
                        start_time = batch.start_time,
                        samples = batch.count(),
                        "dropping batch overlapping stored history"
                    );
                    report.batches_dropped += 1;
                }
            }
        }

        debug!(writes = writes.len(), "committing history writes");
        match self.histories.commit(writes).await {
            Ok(()) => {}
            // Every batch was dropped: nothing to write is not a failure.
            Err(StoreError::EmptyBatch) => debug!("no history writes queued"),
            Err(error) => return Err(ConsolidationError::Write(error)),
        }

        if let Some(watermark) = watermark(&batches) {
            report.watermark = Some(watermark);
            report.events_truncated = truncate(self.events.as_ref(), watermark).await?;
        }

        metrics::counter!(VEHICLES_PROCESSED).increment(report.vehicles as u64);
        metrics::counter!(EVENTS_CONSOLIDATED).increment(report.events as u64);
        metrics::counter!(HISTORIES_CREATED).increment(report.histories_created as u64);
        metrics::counter!(HISTORIES_EXTENDED).increment(report.histories_extended as u64);
        metrics::counter!(BATCHES_DROPPED).increment(report.batches_dropped as u64);
        metrics::counter!(EVENTS_TRUNCATED).increment(report.events_truncated);

        info!(
            vehicles = report.vehicles,
            events = report.events,
            created = report.histories_created,
            extended = report.histories_extended,
            dropped = report.batches_dropped,
            "consolidation pass complete"
        );

        Ok(report)
    }
}
