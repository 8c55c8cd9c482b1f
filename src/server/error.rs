//! HTTP error responses

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use crate::types::{ErrorCode, ForgeError};

/// JSON body returned for every failed request
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub error_code: ErrorCode,
    pub timestamp: DateTime<Utc>,
}

impl IntoResponse for ForgeError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            Self::Validation(_) | Self::Json(_) => (StatusCode::BAD_REQUEST, "Validation error"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
            Self::Cache(_) => (StatusCode::SERVICE_UNAVAILABLE, "Cache unavailable"),
            Self::Analysis { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "Analysis failed"),
            _ => {
                error!(error = %self, "Unhandled request error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        };

        let body = ErrorBody {
            error,
            message: self.to_string(),
            error_code: self.code(),
            timestamp: Utc::now(),
        };

        (status, Json(body)).into_response()
    }
}
