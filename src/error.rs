use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::DatabaseError;
use crate::forecast::{CoordinateError, ForecastError};

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &str, code: &str) -> Self {
        Self {
            status,
            body: ErrorResponse::new(error, code),
        }
    }

    pub fn not_found(error: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, error, "not_found")
    }

    pub fn bad_request(error: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error, "bad_request")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        tracing::error!("Database error: {}", err);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            "database_error",
        )
    }
}

impl From<CoordinateError> for ApiError {
    fn from(err: CoordinateError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, &err.to_string(), "invalid_coordinates")
    }
}

impl From<ForecastError> for ApiError {
    fn from(err: ForecastError) -> Self {
        let code = match err {
            ForecastError::Unavailable(_) => "forecast_unavailable",
            ForecastError::MalformedResponse(_) => "forecast_malformed",
        };
        Self::new(StatusCode::BAD_GATEWAY, &err.to_string(), code)
    }
}
