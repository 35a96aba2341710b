// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types and handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ifc_ids_processing::{PipelineError, PoolError};
use serde::Serialize;
use thiserror::Error;

/// API error types.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing file in request")]
    MissingFile,

    #[error("Missing IDS specifications in request")]
    MissingSpecifications,

    #[error("File too large: maximum size is {max_mb} MB")]
    FileTooLarge { max_mb: usize },

    #[error("Multipart error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("Invalid specification: {0}")]
    InvalidSpecification(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::MissingFile => (StatusCode::BAD_REQUEST, "MISSING_FILE"),
            ApiError::MissingSpecifications => (StatusCode::BAD_REQUEST, "MISSING_SPECIFICATIONS"),
            ApiError::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE"),
            ApiError::Multipart(_) => (StatusCode::BAD_REQUEST, "MULTIPART_ERROR"),
            ApiError::InvalidSpecification(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_SPECIFICATION"),
            ApiError::Processing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PROCESSING_ERROR"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            ApiError::Cache(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CACHE_ERROR"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Specification(e) => ApiError::InvalidSpecification(e.to_string()),
            PipelineError::Pool(PoolError::Terminated) => ApiError::Unavailable("task pool terminated".into()),
            PipelineError::Pool(e) => ApiError::Processing(e.to_string()),
        }
    }
}

impl From<ifc_ids_core::Error> for ApiError {
    fn from(err: ifc_ids_core::Error) -> Self {
        ApiError::Processing(err.to_string())
    }
}

impl From<cacache::Error> for ApiError {
    fn from(err: cacache::Error) -> Self {
        ApiError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_errors_map_to_status() {
        let spec_error = ifc_ids_validation::load_specifications("[").unwrap_err();
        let api: ApiError = PipelineError::Specification(spec_error).into();
        assert_eq!(api.status_and_code(), (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_SPECIFICATION"));

        let api: ApiError = PipelineError::Pool(PoolError::Terminated).into();
        assert_eq!(api.status_and_code().0, StatusCode::SERVICE_UNAVAILABLE);

        let api: ApiError = PipelineError::Pool(PoolError::TaskFailed {
            task_id: 3,
            message: "Failed to open".into(),
        })
        .into();
        assert_eq!(api.status_and_code().1, "PROCESSING_ERROR");
        assert!(api.to_string().contains("Failed to open"));
    }
}
