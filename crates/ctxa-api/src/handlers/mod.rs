//! HTTP request handlers for the adapter API

pub mod callback;
pub mod ngsi;
pub mod version;

use axum::http::StatusCode;

/// Known path, unsupported method
pub async fn method_not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
