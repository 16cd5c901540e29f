//! Error taxonomy for the API surface.
//!
//! Handlers validate input shape first and fail fast; storage and blob
//! failures are wrapped into [`ApiError::Store`] so internals never leak to
//! callers. Responses are binary: a success payload or the uniform
//! `{"errorMessage": ...}` envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use super::handlers::ErrorBody;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input; storage is never touched.
    #[error("{0}")]
    Validation(String),
    /// Unauthenticated or unauthorized session.
    #[error("{0}")]
    Auth(String),
    /// The referenced resource does not exist.
    #[error("{0}")]
    NotFound(String),
    /// A duplicate resource already exists.
    #[error("{0}")]
    Conflict(String),
    /// Persistence or blob-store failure; logged, surfaced generically.
    #[error("storage failure")]
    Store(#[from] anyhow::Error),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Store(err) = &self {
            error!("storage failure: {err:#}");
        }
        let body = ErrorBody {
            error_message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(
            ApiError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Auth("invalid session".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::NotFound("missing".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("duplicate".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Store(anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_errors_surface_generically() {
        let err = ApiError::Store(anyhow!("connection refused on 10.0.0.3"));
        assert_eq!(err.to_string(), "storage failure");
    }

    #[test]
    fn response_carries_the_error_envelope() {
        let response = ApiError::Conflict("directory already exists".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
