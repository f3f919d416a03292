use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use time::OffsetDateTime;

use crate::app_context::AppContext;

async fn readiness() -> &'static str {
    "ok"
}

async fn liveness(State(context): State<Arc<AppContext>>) -> Response {
    if context.is_alive(OffsetDateTime::now_utc()).await {
        (StatusCode::OK, "ok").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "consolidation loop is stuck").into_response()
    }
}

async fn status(State(context): State<Arc<AppContext>>) -> Response {
    Json(context.state.get_status().await).into_response()
}

/// Health and status routes, meant to be merged into the service router.
pub fn app(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/_readiness", get(readiness))
        .route("/_liveness", get(liveness))
        .route("/status", get(status))
        .with_state(context)
}
