//! API error types and conversions
//!
//! NGSI routes report business failures inside a `200` acknowledgement, so
//! these errors only cover requests rejected before any processing.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - a required header is absent
    MissingHeader(&'static str),
    /// 400 Bad Request
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::MissingHeader(name) => (
                StatusCode::BAD_REQUEST,
                "missing_header",
                format!("Missing required header: {}", name),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
        };

        tracing::debug!(error = error_type, %message, "API client error");

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
