//! Mapping of component errors onto HTTP responses for the user API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::ingest::{IngestError, InvalidWindow};
use crate::registry::RegistryError;
use crate::store::StoreError;

/// Errors returned by the user-facing API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body or parameters are unusable.
    #[error("{0}")]
    BadRequest(String),

    /// No API token, or one that matches no user.
    #[error("missing or invalid API token")]
    Unauthorized,

    /// The resource does not exist or belongs to another user.
    #[error("{0}")]
    NotFound(String),

    /// GitHub failed or answered with something unusable.
    #[error("GitHub request failed: {0}")]
    Upstream(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Store(e) => {
                error!(error = %e, "storage failure");
                "internal storage error".to_string()
            }
            _ => self.to_string(),
        };
        (status, message).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::InvalidName(e) => ApiError::BadRequest(e.to_string()),
            RegistryError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            RegistryError::Store(e) => ApiError::Store(e),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Store(e) => ApiError::Store(e),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<InvalidWindow> for ApiError {
    fn from(e: InvalidWindow) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InvalidRepoName;

    #[test]
    fn registry_errors_map_to_client_statuses() {
        let invalid: ApiError = RegistryError::InvalidName(InvalidRepoName("x".into())).into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let missing: ApiError = RegistryError::NotFound {
            name: "a/b".into(),
        }
        .into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn ingest_errors_split_upstream_from_storage() {
        let upstream: ApiError = IngestError::UpstreamStatus { status: 500 }.into();
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);

        let storage: ApiError = IngestError::Store(StoreError::storage("x", "boom")).into();
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn storage_details_are_not_leaked() {
        let response = ApiError::Store(StoreError::storage("insert", "disk I/O error")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
