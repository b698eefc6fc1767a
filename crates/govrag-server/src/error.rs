//! Mapping from pipeline errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use govrag_core::{EmbeddingError, Error, IndexError, LoaderError, ProviderError};

/// Error response body: `{"detail": "..."}`.
#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!("Request failed ({}): {}", status.as_u16(), err);
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), err);
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Loader(LoaderError::UnsupportedFormat(_)) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Provider(e) => match e {
            ProviderError::UnknownProvider(_) => StatusCode::BAD_REQUEST,
            ProviderError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            ProviderError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProviderError::Auth { .. } | ProviderError::InvalidResponse { .. } => StatusCode::BAD_GATEWAY,
        },
        Error::Embedding(EmbeddingError::Provider(_)) => StatusCode::BAD_GATEWAY,
        Error::Index(IndexError::NotInitialized(_)) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
