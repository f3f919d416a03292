use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use bytes::Bytes;
use tracing::{debug, instrument, warn};

use location_core::codec::encode_event;
use location_core::LocationHistory;

use crate::api::{ApiError, IngestResponse, IngestResponseCode};
use crate::prometheus::{report_dropped_events, report_received_events};
use crate::router;

pub const MSGPACK_CONTENT_TYPE: &str = "application/msgpack";

/// Where the synthetic test ping is located.
const TEST_LATITUDE: f64 = 51.4779;
const TEST_LONGITUDE: f64 = -0.0015;

#[instrument(skip_all, fields(content_type, body_size))]
pub async fn event(
    state: State<router::State>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    let content_type = headers
        .get("content-type")
        .map_or("unknown", |v| v.to_str().unwrap_or("unknown"));
    tracing::Span::current().record("content_type", content_type);
    tracing::Span::current().record("body_size", body.len());

    report_received_events(1);

    // Parameters such as a charset are ignored, only the media type matters.
    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case(MSGPACK_CONTENT_TYPE) {
        let err = ApiError::UnsupportedContentType(content_type.to_owned());
        warn!("rejected location event: {}", err);
        report_dropped_events(err.cause(), 1);
        return Err(err);
    }

    match state.events.ingest(&body).await {
        Ok(id) => {
            debug!(id, "accepted location event");
            Ok(Json(IngestResponse {
                status: IngestResponseCode::Ok,
                id,
            }))
        }
        Err(err) => {
            let err = ApiError::from(err);
            warn!("rejected location event: {}", err);
            report_dropped_events(err.cause(), 1);
            Err(err)
        }
    }
}

/// Push a ping for the configured test vehicle at the current time, through the full
/// decode path.
#[instrument(skip_all)]
pub async fn test_event(state: State<router::State>) -> Result<Json<IngestResponse>, ApiError> {
    let now = state.timesource.now_ms();
    let buffer = encode_event(&state.test_vehicle_id, now, TEST_LATITUDE, TEST_LONGITUDE)?;

    let id = state.events.ingest(&buffer).await?;

    Ok(Json(IngestResponse {
        status: IngestResponseCode::Ok,
        id,
    }))
}

#[instrument(skip(state))]
pub async fn history(
    state: State<router::State>,
    Path(vehicle_id): Path<String>,
) -> Result<Json<Vec<LocationHistory>>, ApiError> {
    Ok(Json(state.histories.histories(&vehicle_id).await?))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{self, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt; // for `collect`
    use tower::ServiceExt; // for `oneshot`

    use location_core::history::HistoryMerger;
    use location_core::store::{EventLog, MemoryStore};
    use location_core::time::FixedTime;
    use location_core::{ConsolidationPipeline, Point};

    use super::*;

    const NOW: i64 = 1733510923697;

    fn app(store: Arc<MemoryStore>) -> Router {
        router::router(
            FixedTime::new(NOW),
            store.clone(),
            store,
            60_000,
            "e-00-000",
            false,
        )
    }

    fn insert(buffer: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method(http::Method::POST)
            .uri("/event/insert")
            .header(http::header::CONTENT_TYPE, "application/msgpack")
            .body(Body::from(buffer))
            .unwrap()
    }

    #[tokio::test]
    async fn index() {
        let app = app(Arc::new(MemoryStore::new(10)));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"location capture");
    }

    #[tokio::test]
    async fn insert_success() {
        let store = Arc::new(MemoryStore::new(10));
        let buffer = encode_event("e-00-042", NOW - 500, 50.0, 10.0).unwrap();

        let response = app(store.clone()).oneshot(insert(buffer)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: IngestResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.status, IngestResponseCode::Ok);

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, body.id);
        assert_eq!(pending[0].event.vehicle_id, "e-00-042");
        assert_eq!(pending[0].event.point, Point::new(10.0, 50.0));
    }

    #[tokio::test]
    async fn insert_malformed_body() {
        let store = Arc::new(MemoryStore::new(10));

        let response = app(store.clone())
            .oneshot(insert(b"{\"v\": \"e-00-000\"}".to_vec()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn insert_requires_msgpack_content_type() {
        let store = Arc::new(MemoryStore::new(10));
        let buffer = encode_event("e-00-000", NOW, 50.0, 10.0).unwrap();

        for content_type in [Some("application/json"), Some("application/octet-stream"), None] {
            let mut request = Request::builder()
                .method(http::Method::POST)
                .uri("/event/insert");
            if let Some(content_type) = content_type {
                request = request.header(http::header::CONTENT_TYPE, content_type);
            }

            let response = app(store.clone())
                .oneshot(request.body(Body::from(buffer.clone())).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        }
        assert_eq!(store.pending_count().await.unwrap(), 0);

        let response = app(store.clone())
            .oneshot(
                Request::builder()
                    .method(http::Method::POST)
                    .uri("/event/insert")
                    .header(http::header::CONTENT_TYPE, "Application/MsgPack; charset=binary")
                    .body(Body::from(buffer))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn insert_stale_event() {
        let store = Arc::new(MemoryStore::new(10));
        let buffer = encode_event("e-00-000", NOW - 120_000, 50.0, 10.0).unwrap();

        let response = app(store.clone()).oneshot(insert(buffer)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn insert_duplicate_event() {
        let store = Arc::new(MemoryStore::new(10));
        let buffer = encode_event("e-00-000", NOW, 50.0, 10.0).unwrap();

        let first = app(store.clone())
            .oneshot(insert(buffer.clone()))
            .await
            .unwrap();
        let second = app(store.clone()).oneshot(insert(buffer)).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_event_stores_ping_for_test_vehicle() {
        let store = Arc::new(MemoryStore::new(10));

        let response = app(store.clone())
            .oneshot(
                Request::builder()
                    .method(http::Method::POST)
                    .uri("/event/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event.vehicle_id, "e-00-000");
        assert_eq!(pending[0].event.timestamp_ms, NOW);
        assert!((pending[0].event.point.lat - TEST_LATITUDE).abs() < 0.0001);
        assert!((pending[0].event.point.lon - TEST_LONGITUDE).abs() < 0.0001);
    }

    #[tokio::test]
    async fn history_returns_consolidated_records() {
        let store = Arc::new(MemoryStore::new(10));
        for (offset, lon) in [(-200, 10.0), (-100, 10.5)] {
            let buffer = encode_event("e-00-000", NOW + offset, 50.0, lon).unwrap();
            let response = app(store.clone()).oneshot(insert(buffer)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        ConsolidationPipeline::new(store.clone(), store.clone(), HistoryMerger::default())
            .run()
            .await
            .unwrap();

        let response = app(store.clone())
            .oneshot(
                Request::builder()
                    .uri("/history/e-00-000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body[0]["count"], 2);
        assert_eq!(body[0]["timestamps"], serde_json::json!([NOW - 200, NOW - 100]));
        assert_eq!(body[0]["line_string"]["type"], "LineString");
        assert_eq!(
            body[0]["line_string"]["coordinates"],
            serde_json::json!([[10.0, 50.0], [10.5, 50.0]])
        );
    }

    #[tokio::test]
    async fn history_of_unknown_vehicle_is_empty() {
        let response = app(Arc::new(MemoryStore::new(10)))
            .oneshot(
                Request::builder()
                    .uri("/history/e-99-999")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"[]");
    }
}
