//! In-memory broker and transport for orchestrator tests

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ctxa_core::{
    AdapterError, AdapterResult, Attribute, ContextBroker, ContextElement, ContextResponse,
    ContextResponseBody, FiwareHeaders, OperationDescriptor, QueryContextRequest,
    ServiceDescriptor, StatusCode, ThirdPartyResponse, ThirdPartyTransport,
    UpdateContextRequest,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

/// Single-element queryContext reply
pub fn entity_reply(id: &str, entity_type: &str, attributes: Vec<Attribute>) -> ContextResponseBody {
    let mut element = ContextElement::new(id, entity_type);
    element.attributes = attributes;
    ContextResponseBody {
        context_responses: vec![ContextResponse {
            context_element: element,
            status_code: StatusCode::ok(),
        }],
        error_code: None,
    }
}

/// A complete service entity reply
pub fn service_reply(id: &str, interaction_type: &str, endpoint: &str) -> ContextResponseBody {
    entity_reply(
        id,
        "service",
        vec![
            Attribute::string("provider", "acme"),
            Attribute::string("interaction_type", interaction_type),
            Attribute::string("endpoint", endpoint),
            Attribute::string("method", "POST"),
            Attribute::new("mapping", "object", json!({"path": "/jobs"})),
            Attribute::string("timeout", "2000"),
        ],
    )
}

#[derive(Default)]
pub struct RecordingBroker {
    replies: Mutex<HashMap<String, AdapterResult<ContextResponseBody>>>,
    queries: Mutex<Vec<QueryContextRequest>>,
    updates: Mutex<Vec<(FiwareHeaders, UpdateContextRequest)>>,
    fail_updates: Mutex<bool>,
}

impl RecordingBroker {
    pub fn reply(&self, entity_id: &str, reply: AdapterResult<ContextResponseBody>) {
        self.replies.lock().insert(entity_id.to_string(), reply);
    }

    pub fn fail_updates(&self) {
        *self.fail_updates.lock() = true;
    }

    pub fn queries(&self) -> Vec<QueryContextRequest> {
        self.queries.lock().clone()
    }

    pub fn updates(&self) -> Vec<UpdateContextRequest> {
        self.updates.lock().iter().map(|(_, u)| u.clone()).collect()
    }

    pub fn update_headers(&self) -> Vec<FiwareHeaders> {
        self.updates.lock().iter().map(|(h, _)| h.clone()).collect()
    }

    /// Value of `name` in the `index`-th update
    pub fn updated(&self, index: usize, name: &str) -> Option<Value> {
        let updates = self.updates.lock();
        let (_, update) = updates.get(index)?;
        ctxa_core::attributes::get(&update.context_elements[0].attributes, name).cloned()
    }
}

#[async_trait]
impl ContextBroker for RecordingBroker {
    async fn query_context(
        &self,
        _headers: &FiwareHeaders,
        query: &QueryContextRequest,
    ) -> AdapterResult<ContextResponseBody> {
        self.queries.lock().push(query.clone());
        let id = query.entities.first().map(|e| e.id.clone()).unwrap_or_default();
        self.replies
            .lock()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Err(AdapterError::broker("404", "No context element found")))
    }

    async fn update_context(
        &self,
        headers: &FiwareHeaders,
        request: &UpdateContextRequest,
    ) -> AdapterResult<ContextResponseBody> {
        self.updates.lock().push((headers.clone(), request.clone()));
        if *self.fail_updates.lock() {
            return Err(AdapterError::broker("500", "Internal Server Error"));
        }
        Ok(ContextResponseBody::default())
    }
}

/// Transport that answers every dispatch with the same scripted result
pub struct ScriptedTransport {
    result: AdapterResult<ThirdPartyResponse>,
    calls: Mutex<Vec<(String, String)>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedTransport {
    pub fn replying(status: u16, body: Value) -> Self {
        Self {
            result: Ok(ThirdPartyResponse { status, body }),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn failing(err: AdapterError) -> Self {
        Self {
            result: Err(err),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Like [`replying`](Self::replying), but every dispatch waits for one
    /// permit added to the returned semaphore
    pub fn gated(status: u16, body: Value) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let transport = Self {
            gate: Some(gate.clone()),
            ..Self::replying(status, body)
        };
        (transport, gate)
    }

    /// `(button id, callback url)` of every dispatch
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ThirdPartyTransport for ScriptedTransport {
    async fn dispatch(
        &self,
        _service: &ServiceDescriptor,
        operation: &OperationDescriptor,
        callback_url: &str,
        _headers: &FiwareHeaders,
    ) -> AdapterResult<ThirdPartyResponse> {
        self.calls
            .lock()
            .push((operation.button_id.clone(), callback_url.to_string()));
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.result.clone()
    }
}
