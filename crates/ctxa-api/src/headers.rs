//! Fiware header middleware
//!
//! NGSI routes must carry `Fiware-Service` and `Fiware-ServicePath`; requests
//! without them are rejected with 400 before reaching a handler. The
//! callback route falls back to the configured defaults. Every response
//! carries a `unica-correlator`, echoed from the request or freshly generated.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use ctxa_core::models::{CORRELATOR, FIWARE_SERVICE, FIWARE_SERVICE_PATH};
use ctxa_core::FiwareHeaders;

use crate::error::ApiError;
use crate::state::AppState;

/// Route class as far as header requirements go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderPolicy {
    Required,
    Defaulted,
    Exempt,
}

fn policy(state: &AppState, path: &str) -> HeaderPolicy {
    let config = state.config();
    if config.ngsi_routes().iter().any(|route| route == path) {
        HeaderPolicy::Required
    } else if config.callback_route() == path {
        HeaderPolicy::Defaulted
    } else {
        HeaderPolicy::Exempt
    }
}

fn header(headers: &HeaderMap, name: &'static str) -> Result<Option<String>, ApiError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.to_string()))
            .map_err(|_| ApiError::BadRequest(format!("Header {} is not valid text", name))),
    }
}

fn extract(
    headers: &HeaderMap,
    policy: HeaderPolicy,
    defaults: &FiwareHeaders,
) -> Result<Option<FiwareHeaders>, ApiError> {
    if policy == HeaderPolicy::Exempt {
        return Ok(None);
    }
    let service = header(headers, FIWARE_SERVICE)?;
    let service_path = header(headers, FIWARE_SERVICE_PATH)?;

    let (service, service_path) = match policy {
        HeaderPolicy::Exempt => return Ok(None),
        HeaderPolicy::Required => (
            service.ok_or(ApiError::MissingHeader("Fiware-Service"))?,
            service_path.ok_or(ApiError::MissingHeader("Fiware-ServicePath"))?,
        ),
        HeaderPolicy::Defaulted => (
            service.unwrap_or_else(|| defaults.service.clone()),
            service_path.unwrap_or_else(|| defaults.service_path.clone()),
        ),
    };

    Ok(Some(FiwareHeaders::new(service, service_path)))
}

/// Axum middleware resolving [`FiwareHeaders`] into request extensions.
pub async fn fiware_headers(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let correlator = request
        .headers()
        .get(CORRELATOR)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let path = request.uri().path().to_string();
    let extracted = extract(
        request.headers(),
        policy(&state, &path),
        &state.config().default_headers,
    );

    let mut response = match extracted {
        Ok(Some(headers)) => {
            request
                .extensions_mut()
                .insert(headers.with_correlator(correlator.clone()));
            next.run(request).await
        }
        Ok(None) => next.run(request).await,
        Err(e) => {
            tracing::warn!(%path, %correlator, "Rejecting request without Fiware headers");
            e.into_response()
        }
    };

    if let Ok(value) = HeaderValue::from_str(&correlator) {
        response.headers_mut().insert(CORRELATOR, value);
    }
    response
}
