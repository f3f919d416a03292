use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::error;

use location_core::{PassOutcome, PassReport};

use crate::janitor::Janitor;

/// How many intervals may go by without a loop iteration before we report as dead.
const LIVENESS_INTERVALS: u32 = 4;

pub struct AppContext {
    pub janitor: Janitor,
    pub state: AppState,
    pub interval: Duration,
    started_at: OffsetDateTime,
}

impl AppContext {
    pub fn new(janitor: Janitor, interval: Duration) -> Self {
        Self {
            janitor,
            state: AppState::default(),
            interval,
            started_at: OffsetDateTime::now_utc(),
        }
    }

    /// Run a pass every `interval`, the first one an interval after startup.
    pub async fn cleanup_loop(&self) {
        let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        {
            let mut status = self.state.get_status().await;
            status.next_run = Some(OffsetDateTime::now_utc() + self.interval);
            self.state.set_status(status).await;
        }

        loop {
            interval.tick().await;
            let mut next_status = run_once(self).await;
            next_status.next_run = Some(OffsetDateTime::now_utc() + self.interval);
            self.state.set_status(next_status).await;
        }
    }

    /// Whether the loop went around recently enough.
    pub async fn is_alive(&self, now: OffsetDateTime) -> bool {
        let last_seen = self
            .state
            .get_status()
            .await
            .last_heartbeat
            .unwrap_or(self.started_at);

        now - last_seen <= self.interval * LIVENESS_INTERVALS
    }
}

/// Run a single pass, folding its outcome into the current status.
pub async fn run_once(context: &AppContext) -> ConsolidationStatus {
    let mut status = context.state.get_status().await;
    let now = OffsetDateTime::now_utc();
    status.last_heartbeat = Some(now);

    match context.janitor.run_once().await {
        Ok(PassOutcome::Completed(report)) => {
            status.last_successful_run = Some(now);
            status.last_report = Some(report);
            status.consecutive_failures = 0;
        }
        Ok(PassOutcome::Skipped) => {
            status.skipped_runs += 1;
        }
        Err(e) => {
            error!("consolidation pass failed with: {}", e);
            status.last_error = Some(e.to_string());
            status.last_error_time = Some(now);
            status.consecutive_failures += 1;
        }
    }

    status
}

// Shared between the cleanup loop and the status endpoints.
#[derive(Debug, Default)]
pub struct AppState {
    status: Mutex<ConsolidationStatus>,
}

// Displayed on the status endpoint.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ConsolidationStatus {
    pub last_report: Option<PassReport>,
    pub last_error: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_error_time: Option<OffsetDateTime>,
    pub consecutive_failures: u64,
    pub skipped_runs: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_successful_run: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_heartbeat: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_run: Option<OffsetDateTime>,
}

impl AppState {
    // The loop and the http handlers only ever exchange snapshots, so neither
    // holds the lock for long.
    pub async fn get_status(&self) -> ConsolidationStatus {
        self.status.lock().await.clone()
    }

    pub async fn set_status(&self, status: ConsolidationStatus) {
        *self.status.lock().await = status;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use location_core::store::{EventLog, HistoryStore, MemoryStore, StoreResult, WriteBatch};
    use location_core::{LocationEvent, LocationHistory, Point, StoreError};

    use super::*;

    /// Reads fine, but every commit fails.
    struct ReadOnlyHistories;

    #[async_trait]
    impl HistoryStore for ReadOnlyHistories {
        async fn latest_history(&self, _: &str) -> StoreResult<Option<LocationHistory>> {
            Ok(None)
        }

        async fn histories(&self, _: &str) -> StoreResult<Vec<LocationHistory>> {
            Ok(vec![])
        }

        async fn commit(&self, _: WriteBatch) -> StoreResult<()> {
            Err(StoreError::Corrupt("read only".to_owned()))
        }
    }

    fn context(store: Arc<MemoryStore>) -> AppContext {
        AppContext::new(
            Janitor::new(store.clone(), store, 100),
            Duration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn test_run_once_records_report() {
        let store = Arc::new(MemoryStore::new(100));
        store
            .append(LocationEvent::new("e-00-000", 1000, Point::new(10.0, 50.0)))
            .await
            .unwrap();
        let context = context(store.clone());

        let status = run_once(&context).await;

        let report = status.last_report.unwrap();
        assert_eq!(report.events, 1);
        assert_eq!(report.histories_created, 1);
        assert!(status.last_successful_run.is_some());
        assert!(status.last_heartbeat.is_some());
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_once_records_failure() {
        let store = Arc::new(MemoryStore::new(100));
        store
            .append(LocationEvent::new("e-00-000", 1000, Point::new(10.0, 50.0)))
            .await
            .unwrap();
        let context = AppContext::new(
            Janitor::new(store.clone(), Arc::new(ReadOnlyHistories), 100),
            Duration::from_secs(300),
        );

        let status = run_once(&context).await;
        context.state.set_status(status).await;
        let status = run_once(&context).await;

        assert_eq!(status.consecutive_failures, 2);
        assert!(status.last_error.unwrap().contains("read only"));
        assert!(status.last_error_time.is_some());
        assert!(status.last_successful_run.is_none());
        assert!(status.last_report.is_none());
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_liveness_deadline() {
        let context = context(Arc::new(MemoryStore::new(100)));
        let now = OffsetDateTime::now_utc();

        assert!(context.is_alive(now).await);
        assert!(!context.is_alive(now + Duration::from_secs(300 * 5)).await);

        let status = run_once(&context).await;
        context.state.set_status(status).await;
        assert!(context.is_alive(OffsetDateTime::now_utc()).await);
    }
}
