//! Third-party dispatcher
//!
//! A thin transport: builds the outbound payload, sends it with the method
//! and timeout of the service descriptor, and hands the raw reply back.

use std::time::Duration;

use async_trait::async_trait;
use ctxa_core::models::{CORRELATOR, FIWARE_SERVICE, FIWARE_SERVICE_PATH};
use ctxa_core::{
    AdapterError, AdapterResult, FiwareHeaders, InteractionType, OperationDescriptor,
    ServiceDescriptor, ThirdPartyResponse, ThirdPartyTransport,
};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::broker::transport_code;

/// Outbound body: `{button, action, extra}`, plus `callback` when the
/// service answers asynchronously
pub fn build_payload(
    service: &ServiceDescriptor,
    operation: &OperationDescriptor,
    callback_url: &str,
) -> Value {
    let mut payload = json!({
        "button": operation.button_id,
        "action": operation.action.as_str(),
        "extra": operation.extra,
    });
    if service.interaction_type == InteractionType::Asynchronous {
        payload["callback"] = Value::String(callback_url.to_string());
    }
    payload
}

/// reqwest-backed [`ThirdPartyTransport`]
#[derive(Debug, Clone, Default)]
pub struct HttpDispatcher {
    client: Client,
}

impl HttpDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse an existing client (connection pool, default headers)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ThirdPartyTransport for HttpDispatcher {
    #[instrument(skip_all, fields(button_id = %operation.button_id, service_id = %service.id))]
    async fn dispatch(
        &self,
        service: &ServiceDescriptor,
        operation: &OperationDescriptor,
        callback_url: &str,
        headers: &FiwareHeaders,
    ) -> AdapterResult<ThirdPartyResponse> {
        let method = Method::from_bytes(service.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                AdapterError::third_party("BAD_METHOD", format!("invalid method '{}'", service.method))
            })?;
        let url = service.target_url();
        let payload = build_payload(service, operation, callback_url);
        debug!(%method, %url, "Dispatching to third party");

        let mut request = self
            .client
            .request(method, &url)
            .header(FIWARE_SERVICE, &headers.service)
            .header(FIWARE_SERVICE_PATH, &headers.service_path)
            .json(&payload);
        if let Some(correlator) = &headers.correlator {
            request = request.header(CORRELATOR, correlator);
        }
        if service.timeout_ms > 0 {
            request = request.timeout(Duration::from_millis(service.timeout_ms));
        }

        let response = request
            .send()
            .await
            .map_err(|e| AdapterError::third_party(transport_code(&e), e.to_string()))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AdapterError::third_party(transport_code(&e), e.to_string()))?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        debug!(status, "Third party replied");
        Ok(ThirdPartyResponse { status, body })
    }
}
