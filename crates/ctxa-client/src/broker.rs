//! Context broker HTTP client

use std::time::Duration;

use async_trait::async_trait;
use ctxa_core::models::{CORRELATOR, FIWARE_SERVICE, FIWARE_SERVICE_PATH};
use ctxa_core::{
    AdapterError, AdapterResult, ContextBroker, ContextResponseBody, FiwareHeaders,
    QueryContextRequest, UpdateContextRequest,
};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument, warn};
use url::Url;

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Classify a reqwest transport failure into a short broker error code
pub(crate) fn transport_code(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "TIMEOUT"
    } else if err.is_connect() {
        "CONNECTION_FAILED"
    } else if err.is_decode() {
        "DECODE"
    } else {
        "HTTP"
    }
}

/// NGSI v1 broker client.
///
/// Every failure, including an `errorCode` envelope answered with HTTP 200
/// and per-element status codes other than 200, is normalized into
/// [`AdapterError::Broker`]. Calls are never retried.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    client: Client,
    base_url: Url,
}

impl BrokerClient {
    /// Create a client for a broker base URL such as `http://localhost:1026/v1`
    pub fn new(base_url: &str) -> AdapterResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> AdapterResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AdapterError::broker("CLIENT", e.to_string()))?;

        // A trailing slash makes `join` append instead of replacing the last segment
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| AdapterError::broker("INVALID_URL", format!("{}: {}", base_url, e)))?;

        Ok(Self { client, base_url })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, operation: &str) -> AdapterResult<Url> {
        self.base_url
            .join(operation)
            .map_err(|e| AdapterError::broker("INVALID_URL", e.to_string()))
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        operation: &str,
        headers: &FiwareHeaders,
        body: &B,
    ) -> AdapterResult<ContextResponseBody> {
        let url = self.endpoint(operation)?;
        debug!(%url, service = %headers.service, "Broker request");

        let mut request = self
            .client
            .post(url)
            .header(FIWARE_SERVICE, &headers.service)
            .header(FIWARE_SERVICE_PATH, &headers.service_path)
            .json(body);
        if let Some(correlator) = &headers.correlator {
            request = request.header(CORRELATOR, correlator);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AdapterError::broker(transport_code(&e), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = if text.is_empty() {
                status.canonical_reason().unwrap_or("error").to_string()
            } else {
                text
            };
            warn!(status = status.as_u16(), %message, "Broker returned error status");
            return Err(AdapterError::broker(status.as_u16().to_string(), message));
        }

        let body: ContextResponseBody = response
            .json()
            .await
            .map_err(|e| AdapterError::broker("PARSE", format!("Invalid broker response: {}", e)))?;

        if let Some(error_code) = &body.error_code {
            return Err(AdapterError::broker(
                error_code.code.clone(),
                error_code.reason_phrase.clone(),
            ));
        }

        if let Some(failed) = body
            .context_responses
            .iter()
            .find(|r| !r.status_code.is_ok())
        {
            return Err(AdapterError::broker(
                failed.status_code.code.clone(),
                format!(
                    "{} ({})",
                    failed.status_code.reason_phrase, failed.context_element.id
                ),
            ));
        }

        Ok(body)
    }
}

#[async_trait]
impl ContextBroker for BrokerClient {
    #[instrument(skip(self, query), fields(service = %headers.service))]
    async fn query_context(
        &self,
        headers: &FiwareHeaders,
        query: &QueryContextRequest,
    ) -> AdapterResult<ContextResponseBody> {
        self.post("queryContext", headers, query).await
    }

    #[instrument(skip(self, request), fields(service = %headers.service))]
    async fn update_context(
        &self,
        headers: &FiwareHeaders,
        request: &UpdateContextRequest,
    ) -> AdapterResult<ContextResponseBody> {
        self.post("updateContext", headers, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBroker, TestServer};
    use ctxa_core::{Attribute, ContextElement, UpdateAction};
    use serde_json::json;

    #[test]
    fn endpoint_appends_operation() {
        let client = BrokerClient::new("http://localhost:1026/v1").unwrap();
        assert_eq!(
            client.endpoint("queryContext").unwrap().as_str(),
            "http://localhost:1026/v1/queryContext"
        );
        let client = BrokerClient::new("http://localhost:1026/v1/").unwrap();
        assert_eq!(
            client.endpoint("updateContext").unwrap().as_str(),
            "http://localhost:1026/v1/updateContext"
        );
    }

    #[test]
    fn invalid_url_is_broker_error() {
        let err = BrokerClient::new("not a url").unwrap_err();
        assert_eq!(err.code(), "BROKER_ERROR");
    }

    #[tokio::test]
    async fn error_envelope_becomes_broker_error() {
        let broker = MockBroker::new();
        let server = TestServer::start(broker.router()).await.unwrap();
        let client = BrokerClient::new(&format!("{}/v1", server.base_url())).unwrap();

        let query = QueryContextRequest::single("unknown", "service", ["endpoint"]);
        let err = client
            .query_context(&FiwareHeaders::new("tenant", "/"), &query)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AdapterError::broker("404", "No context element found")
        );
    }

    #[tokio::test]
    async fn query_forwards_fiware_headers() {
        let broker = MockBroker::new();
        broker.respond_to_query(
            "svc1",
            json!({
                "contextResponses": [{
                    "contextElement": {"id": "svc1", "type": "service", "isPattern": "false", "attributes": []},
                    "statusCode": {"code": "200", "reasonPhrase": "OK"}
                }]
            }),
        );
        let server = TestServer::start(broker.router()).await.unwrap();
        let client = BrokerClient::new(&format!("{}/v1", server.base_url())).unwrap();

        let headers = FiwareHeaders::new("tenant", "/sub").with_correlator("corr-1");
        let query = QueryContextRequest::single("svc1", "service", ["endpoint"]);
        let body = client.query_context(&headers, &query).await.unwrap();
        assert_eq!(body.context_responses[0].context_element.id, "svc1");

        let recorded = broker.queries();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].service.as_deref(), Some("tenant"));
        assert_eq!(recorded[0].service_path.as_deref(), Some("/sub"));
        assert_eq!(recorded[0].body["attributes"], json!(["endpoint"]));
    }

    #[tokio::test]
    async fn update_is_recorded() {
        let broker = MockBroker::new();
        let server = TestServer::start(broker.router()).await.unwrap();
        let client = BrokerClient::new(&format!("{}/v1", server.base_url())).unwrap();

        let request = UpdateContextRequest {
            context_elements: vec![ContextElement::new("btn1", "button")
                .with_attribute(Attribute::string("op_status", "closed"))],
            update_action: UpdateAction::Append,
        };
        client
            .update_context(&FiwareHeaders::new("tenant", "/"), &request)
            .await
            .unwrap();

        let updates = broker.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].attribute("btn1", "op_status"), Some(json!("closed")));
    }

    #[tokio::test]
    async fn connection_failure_is_broker_error() {
        // Nothing listens on port 9 of the loopback interface
        let client =
            BrokerClient::with_timeout("http://127.0.0.1:9/v1", Duration::from_secs(2)).unwrap();
        let err = client
            .update_context(
                &FiwareHeaders::new("tenant", "/"),
                &UpdateContextRequest {
                    context_elements: vec![],
                    update_action: UpdateAction::Append,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BROKER_ERROR");
    }
}
