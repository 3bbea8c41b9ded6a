//! Test utilities for ctxa-client
//!
//! Provides an ephemeral-port [`TestServer`] for axum routers and a
//! recording [`MockBroker`] that answers NGSI queryContext/updateContext.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use ctxa_core::models::{FIWARE_SERVICE, FIWARE_SERVICE_PATH};
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Serve an axum Router on `127.0.0.1:<ephemeral>`
    pub async fn start(router: Router) -> std::io::Result<Self> {
        Self::start_with_timeout(router, Duration::from_secs(5)).await
    }

    /// Serve a router; `timeout` applies to the bundled client
    pub async fn start_with_timeout(router: Router, timeout: Duration) -> std::io::Result<Self> {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(std::io::Error::other)?;

        Ok(Self {
            addr,
            client,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// One request received by the [`MockBroker`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub service: Option<String>,
    pub service_path: Option<String>,
    pub body: Value,
}

impl RecordedRequest {
    /// Value of `attribute` on element `entity_id` of an updateContext body
    pub fn attribute(&self, entity_id: &str, attribute: &str) -> Option<Value> {
        self.body
            .get("contextElements")?
            .as_array()?
            .iter()
            .find(|e| e.get("id").and_then(Value::as_str) == Some(entity_id))?
            .get("attributes")?
            .as_array()?
            .iter()
            .find(|a| a.get("name").and_then(Value::as_str) == Some(attribute))
            .and_then(|a| a.get("value").cloned())
    }
}

#[derive(Default)]
struct MockBrokerState {
    responses: RwLock<HashMap<String, Value>>,
    queries: RwLock<Vec<RecordedRequest>>,
    updates: RwLock<Vec<RecordedRequest>>,
    update_status: RwLock<Option<u16>>,
    changed: Notify,
}

/// In-memory NGSI broker.
///
/// queryContext answers with the body registered for the first queried
/// entity id, or a `404` error envelope. updateContext records the body and
/// acknowledges every element.
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<MockBrokerState>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the full queryContext reply for an entity id
    pub fn respond_to_query(&self, entity_id: &str, body: Value) {
        self.state
            .responses
            .write()
            .insert(entity_id.to_string(), body);
    }

    /// Answer updateContext with this HTTP status instead of 200
    pub fn fail_updates_with(&self, status: u16) {
        *self.state.update_status.write() = Some(status);
    }

    pub fn queries(&self) -> Vec<RecordedRequest> {
        self.state.queries.read().clone()
    }

    pub fn updates(&self) -> Vec<RecordedRequest> {
        self.state.updates.read().clone()
    }

    /// Wait until at least `count` updates were recorded, or `timeout` elapses
    pub async fn wait_for_updates(&self, count: usize, timeout: Duration) -> Vec<RecordedRequest> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.state.changed.notified();
            let updates = self.updates();
            if updates.len() >= count {
                return updates;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.updates();
            }
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1/queryContext", post(query_context))
            .route("/v1/updateContext", post(update_context))
            .with_state(self.state.clone())
    }
}

fn record(headers: &HeaderMap, body: Value) -> RecordedRequest {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    RecordedRequest {
        service: header(FIWARE_SERVICE),
        service_path: header(FIWARE_SERVICE_PATH),
        body,
    }
}

async fn query_context(
    State(state): State<Arc<MockBrokerState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let entity_id = body["entities"][0]["id"].as_str().unwrap_or_default().to_string();
    state.queries.write().push(record(&headers, body));
    state.changed.notify_waiters();

    let reply = state.responses.read().get(&entity_id).cloned();
    Json(reply.unwrap_or_else(|| {
        json!({"errorCode": {"code": "404", "reasonPhrase": "No context element found"}})
    }))
}

async fn update_context(
    State(state): State<Arc<MockBrokerState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (axum::http::StatusCode, Json<Value>) {
    let responses: Vec<Value> = body["contextElements"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|element| {
            json!({
                "contextElement": element,
                "statusCode": {"code": "200", "reasonPhrase": "OK"}
            })
        })
        .collect();
    state.updates.write().push(record(&headers, body));
    state.changed.notify_waiters();

    let status = state
        .update_status
        .read()
        .and_then(|s| axum::http::StatusCode::from_u16(s).ok())
        .unwrap_or(axum::http::StatusCode::OK);
    (status, Json(json!({"contextResponses": responses})))
}

/// Wait for a condition with timeout
pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_attribute_lookup() {
        let request = RecordedRequest {
            service: None,
            service_path: None,
            body: json!({
                "contextElements": [{
                    "id": "btn1",
                    "attributes": [{"name": "op_status", "type": "string", "value": "completed"}]
                }]
            }),
        };
        assert_eq!(request.attribute("btn1", "op_status"), Some(json!("completed")));
        assert_eq!(request.attribute("btn2", "op_status"), None);
    }
}
