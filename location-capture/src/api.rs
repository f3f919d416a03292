use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use location_core::error::{EncodeError, IngestError, StoreError};
use location_core::EventId;

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum IngestResponseCode {
    Ok = 1,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct IngestResponse {
    pub status: IngestResponseCode,
    pub id: EventId,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("failed to read histories: {0}")]
    Store(#[from] StoreError),
    #[error("failed to build test event: {0}")]
    TestEvent(#[from] EncodeError),
    #[error("unsupported content type {0}, expected application/msgpack")]
    UnsupportedContentType(String),
}

impl ApiError {
    /// Short label for the rejection, used as a metric tag.
    pub fn cause(&self) -> &'static str {
        match self {
            ApiError::Ingest(IngestError::Validation(_)) => "invalid",
            ApiError::Ingest(IngestError::Stale { .. }) => "stale",
            ApiError::Ingest(IngestError::Duplicate { .. }) => "duplicate",
            ApiError::Ingest(IngestError::Store(_)) | ApiError::Store(_) => "store",
            ApiError::TestEvent(_) => "internal",
            ApiError::UnsupportedContentType(_) => "content_type",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Ingest(IngestError::Validation(_))
            | ApiError::Ingest(IngestError::Stale { .. }) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }

            ApiError::Ingest(IngestError::Duplicate { .. }) => {
                (StatusCode::CONFLICT, self.to_string())
            }

            ApiError::Ingest(IngestError::Store(_)) | ApiError::Store(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }

            ApiError::TestEvent(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),

            ApiError::UnsupportedContentType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, self.to_string())
            }
        }
        .into_response()
    }
}

#[cfg(test)]
mod tests {
    use location_core::error::{RangeError, ValidationError};

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::from(IngestError::Validation(ValidationError::MalformedHeader)),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(IngestError::Validation(ValidationError::Range(
                    RangeError::NullIsland,
                ))),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(IngestError::Stale {
                    timestamp_ms: 0,
                    window_ms: 60_000,
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(IngestError::Duplicate {
                    vehicle_id: "e-00-000".to_owned(),
                    timestamp_ms: 1000,
                }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(IngestError::Store(StoreError::Corrupt("bad".to_owned()))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::from(StoreError::EmptyBatch),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::UnsupportedContentType("application/json".to_owned()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
