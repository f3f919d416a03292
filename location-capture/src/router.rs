use std::future::ready;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use location_core::ingest::RawEventStore;
use location_core::store::{EventLog, HistoryStore};
use location_core::time::TimeSource;

use crate::capture;
use crate::prometheus::{setup_metrics_recorder, track_metrics};

#[derive(Clone)]
pub struct State {
    pub events: Arc<RawEventStore>,
    pub histories: Arc<dyn HistoryStore>,
    pub timesource: Arc<dyn TimeSource + Send + Sync>,
    pub test_vehicle_id: Arc<str>,
}

async fn index() -> &'static str {
    "location capture"
}

pub fn router<TZ: TimeSource + Send + Sync + 'static>(
    timesource: TZ,
    events: Arc<dyn EventLog>,
    histories: Arc<dyn HistoryStore>,
    staleness_window_ms: i64,
    test_vehicle_id: &str,
    metrics: bool,
) -> Router {
    let timesource: Arc<dyn TimeSource + Send + Sync> = Arc::new(timesource);
    let state = State {
        events: Arc::new(RawEventStore::new(
            events,
            timesource.clone(),
            staleness_window_ms,
        )),
        histories,
        timesource,
        test_vehicle_id: Arc::from(test_vehicle_id),
    };

    let router = Router::new()
        .route("/", get(index))
        .route("/event/insert", post(capture::event))
        .route("/event/test", post(capture::test_event))
        .route("/history/:vehicle_id", get(capture::history))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Installing a global recorder when used as a library (during tests etc)
    // does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();

        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
