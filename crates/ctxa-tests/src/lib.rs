//! Integration tests for the context adapter
//!
//! This crate runs the whole adapter in-process against HTTP mocks:
//! - a [`MockBroker`] answering queryContext/updateContext
//! - a scripted third-party service ([`ThirdParty`])
//! - the adapter router itself, served by a [`TestServer`]
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p ctxa-tests
//! ```
//!
//! # Test Structure
//!
//! - `context_provider_e2e.rs` - updateContext flows, synchronous and create actions
//! - `callback_e2e.rs` - asynchronous completion through the webhook

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::any;
use axum::{Json, Router};
use ctxa_api::{create_router, ApiConfig, AppState};
use ctxa_client::testing::{MockBroker, TestServer};
use ctxa_client::{BrokerClient, HttpDispatcher};
use ctxa_core::{AdapterMode, EntityAttributeScheme};
use ctxa_orchestrator::OperationOrchestrator;
use parking_lot::Mutex;
use serde_json::{json, Value};

pub use ctxa_client::testing::wait_for;

/// Callback URL the adapter hands to asynchronous services
pub const CALLBACK_URL: &str = "http://adapter.test/v1/callback";

/// Mock third-party service answering every request on `/svc/jobs` with a
/// fixed status and body, recording what it received
pub struct ThirdParty {
    server: TestServer,
    received: Arc<Mutex<Vec<Value>>>,
}

impl ThirdParty {
    pub async fn start(status: u16, reply: Value) -> Self {
        let received: Arc<Mutex<Vec<Value>>> = Arc::default();
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let router = Router::new()
            .route(
                "/svc/jobs",
                any(
                    move |State(received): State<Arc<Mutex<Vec<Value>>>>, Json(body): Json<Value>| {
                        let reply = reply.clone();
                        async move {
                            received.lock().push(body);
                            (status, Json(reply))
                        }
                    },
                ),
            )
            .with_state(received.clone());

        let server = TestServer::start(router)
            .await
            .unwrap_or_else(|e| panic!("third party failed to start: {}", e));
        Self { server, received }
    }

    /// Endpoint to register on the service entity (mapping path is `/jobs`)
    pub fn endpoint(&self) -> String {
        format!("{}/svc", self.server.base_url())
    }

    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }
}

/// queryContext reply describing service `id`
pub fn service_entity(id: &str, interaction_type: &str, endpoint: &str) -> Value {
    json!({
        "contextResponses": [{
            "contextElement": {
                "id": id,
                "type": "service",
                "isPattern": "false",
                "attributes": [
                    {"name": "provider", "type": "string", "value": "acme"},
                    {"name": "interaction_type", "type": "string", "value": interaction_type},
                    {"name": "endpoint", "type": "string", "value": endpoint},
                    {"name": "method", "type": "string", "value": "POST"},
                    {"name": "authentication", "type": "object", "value": {"type": "none"}},
                    {"name": "mapping", "type": "object", "value": {"path": "/jobs"}},
                    {"name": "timeout", "type": "string", "value": "2000"}
                ]
            },
            "statusCode": {"code": "200", "reasonPhrase": "OK"}
        }]
    })
}

/// queryContext reply for a button carrying only `interaction_type`
pub fn button_entity(id: &str, interaction_type: &str) -> Value {
    json!({
        "contextResponses": [{
            "contextElement": {
                "id": id,
                "type": "BlackButton",
                "isPattern": "false",
                "attributes": [
                    {"name": "interaction_type", "type": "string", "value": interaction_type}
                ]
            },
            "statusCode": {"code": "200", "reasonPhrase": "OK"}
        }]
    })
}

/// updateContext body as the broker forwards it to a context provider
pub fn update_context(button_id: &str, attributes: Value) -> Value {
    json!({
        "contextElements": [{
            "id": button_id,
            "type": "BlackButton",
            "isPattern": "false",
            "attributes": attributes
        }],
        "updateAction": "UPDATE"
    })
}

/// `aux_`-prefixed request attributes
pub fn aux_attributes(service_id: &str, action: &str, interaction_type: Option<&str>) -> Value {
    let mut attributes = vec![
        json!({"name": "aux_service_id", "type": "string", "value": service_id}),
        json!({"name": "aux_op_action", "type": "string", "value": action}),
        json!({"name": "aux_op_extra", "type": "string", "value": "x"}),
    ];
    if let Some(interaction_type) = interaction_type {
        attributes.push(json!({
            "name": "aux_interaction_type",
            "type": "string",
            "value": interaction_type
        }));
    }
    Value::Array(attributes)
}

/// Adapter in the given mode wired to a mock broker
pub struct Stack {
    pub broker: MockBroker,
    pub adapter: TestServer,
    _broker_server: TestServer,
}

impl Stack {
    pub async fn start(mode: AdapterMode) -> Self {
        let broker = MockBroker::new();
        let broker_server = TestServer::start(broker.router())
            .await
            .unwrap_or_else(|e| panic!("mock broker failed to start: {}", e));

        let client = BrokerClient::new(&format!("{}/v1", broker_server.base_url()))
            .unwrap_or_else(|e| panic!("invalid broker url: {}", e));
        let scheme = Arc::new(EntityAttributeScheme::new(mode, "BlackButton", "service"));
        let orchestrator = Arc::new(OperationOrchestrator::new(
            Arc::new(client),
            Arc::new(HttpDispatcher::new()),
            scheme,
            CALLBACK_URL,
        ));

        let state = AppState::new(orchestrator, ApiConfig::default());
        let adapter = TestServer::start(create_router(state))
            .await
            .unwrap_or_else(|e| panic!("adapter failed to start: {}", e));

        Self {
            broker,
            adapter,
            _broker_server: broker_server,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.adapter.base_url(), path)
    }

    /// POST `body` to an adapter route with Fiware headers
    pub async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.adapter
            .client
            .post(self.url(path))
            .header("Fiware-Service", "blackbutton")
            .header("Fiware-ServicePath", "/")
            .json(body)
            .send()
            .await
            .unwrap_or_else(|e| panic!("POST {} failed: {}", path, e))
    }
}
