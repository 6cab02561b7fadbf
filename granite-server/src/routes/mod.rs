//! HTTP handlers, organised by domain:
//! - `health`: liveness probe
//! - `generate`: job submission with optional upload
//! - `jobs`: job queries, video download, cancellation and live events

pub mod generate;
pub mod health;
pub mod jobs;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use granite::error::WorkerError;
use granite::JobStoreError;
use serde::Serialize;

/// Response wrapper for API calls.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// An error response: status code plus an `ApiResponse` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("Request failed: {}", self.message);
        }
        (self.status, Json(ApiResponse::<()>::err(self.message))).into_response()
    }
}

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        match e {
            WorkerError::EmptyRequest => ApiError::bad_request(e.to_string()),
            WorkerError::UnknownJob(_) => ApiError::not_found(e.to_string()),
            WorkerError::AlreadyFinished(_) => ApiError::conflict(e.to_string()),
            WorkerError::Register(_) => ApiError::internal(e.to_string()),
        }
    }
}

impl From<JobStoreError> for ApiError {
    fn from(e: JobStoreError) -> Self {
        match e {
            JobStoreError::NotFound(id) => ApiError::not_found(format!("Job not found: {}", id)),
            JobStoreError::AlreadyFinished(_) | JobStoreError::AlreadyExists(_) => {
                ApiError::conflict(e.to_string())
            }
        }
    }
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;
