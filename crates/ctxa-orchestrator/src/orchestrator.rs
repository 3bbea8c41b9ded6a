//! Operation orchestration
//!
//! [`OperationOrchestrator::run`] drives one button operation from service
//! resolution to its status notification. [`OperationOrchestrator::handle_callback`]
//! completes an asynchronous operation when the third party calls back.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ctxa_core::attributes::{self, value_text};
use ctxa_core::{
    encode_details, AdapterError, AdapterResult, ButtonAttribute, ContextBroker,
    EntityAttributeScheme, FiwareHeaders, InteractionType, OperationAction, OperationDescriptor,
    OperationOutcome, OperationStatus, QueryContextRequest, ServiceDescriptor,
    ThirdPartyResponse, ThirdPartyTransport,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::locks::ButtonLocks;
use crate::notifier::Notifier;
use crate::resolver::ServiceResolver;

/// Body fields a create reply may carry the third party's job id in
const EXTERNAL_ID_FIELDS: [&str; 3] = ["id", "externalId", "external_id"];

/// Lifecycle of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationState {
    Validating,
    ResolvingService,
    Dispatching,
    Completed,
    Closed,
    InProgress,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Validating => "VALIDATING",
            OperationState::ResolvingService => "RESOLVING_SERVICE",
            OperationState::Dispatching => "DISPATCHING",
            OperationState::Completed => "COMPLETED",
            OperationState::Closed => "CLOSED",
            OperationState::InProgress => "IN_PROGRESS",
        }
    }

    /// Whether no further transition can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Completed | OperationState::Closed)
    }
}

impl From<OperationStatus> for OperationState {
    fn from(status: OperationStatus) -> Self {
        match status {
            OperationStatus::Pending => OperationState::Validating,
            OperationStatus::InProgress => OperationState::InProgress,
            OperationStatus::Completed => OperationState::Completed,
            OperationStatus::Closed => OperationState::Closed,
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by a third party in its callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackError {
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub message: String,
}

/// Body POSTed by a third party to the callback route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub button: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub extra: Option<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
    #[serde(default)]
    pub error: Option<CallbackError>,
}

impl CallbackPayload {
    fn outcome(&self) -> OperationOutcome {
        match &self.error {
            Some(err) => OperationOutcome::Failure(AdapterError::third_party(
                value_text(&err.code).unwrap_or_else(|| "CALLBACK".to_string()),
                err.message.clone(),
            )),
            None => OperationOutcome::Success {
                details: self.details.clone(),
            },
        }
    }
}

/// Callbacks that arrived while their create request was still in flight,
/// keyed by button id. A `None` slot marks a create awaiting its reply.
#[derive(Default)]
struct EarlyCallbacks {
    slots: Mutex<HashMap<String, Option<(CallbackPayload, FiwareHeaders)>>>,
}

impl EarlyCallbacks {
    fn open(&self, button_id: &str) {
        self.slots.lock().insert(button_id.to_string(), None);
    }

    /// Park `payload` when a create for its button is in flight
    fn park(
        &self,
        payload: CallbackPayload,
        headers: FiwareHeaders,
    ) -> Option<(CallbackPayload, FiwareHeaders)> {
        let mut slots = self.slots.lock();
        match slots.get_mut(&payload.button) {
            Some(slot) => {
                if slot.is_some() {
                    warn!(button_id = %payload.button, "Replacing an earlier parked callback");
                }
                *slot = Some((payload, headers));
                None
            }
            None => Some((payload, headers)),
        }
    }

    fn take(&self, button_id: &str) -> Option<(CallbackPayload, FiwareHeaders)> {
        self.slots.lock().remove(button_id).flatten()
    }

    fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

/// Runs operations against the broker and the third-party transport.
///
/// Operations on the same button are serialized through `operations`,
/// held from resolution until the status notification has been sent.
/// Every status write, callbacks included, goes through `writes`, which
/// is never held across a third-party call.
pub struct OperationOrchestrator {
    broker: Arc<dyn ContextBroker>,
    transport: Arc<dyn ThirdPartyTransport>,
    scheme: Arc<EntityAttributeScheme>,
    resolver: ServiceResolver,
    notifier: Notifier,
    operations: ButtonLocks,
    writes: ButtonLocks,
    early: EarlyCallbacks,
    callback_url: String,
}

impl OperationOrchestrator {
    pub fn new(
        broker: Arc<dyn ContextBroker>,
        transport: Arc<dyn ThirdPartyTransport>,
        scheme: Arc<EntityAttributeScheme>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            resolver: ServiceResolver::new(broker.clone(), scheme.clone()),
            notifier: Notifier::new(broker.clone(), scheme.clone()),
            broker,
            transport,
            scheme,
            operations: ButtonLocks::new(),
            writes: ButtonLocks::new(),
            early: EarlyCallbacks::default(),
            callback_url: callback_url.into(),
        }
    }

    /// Public URL handed to asynchronous services
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub fn scheme(&self) -> &EntityAttributeScheme {
        &self.scheme
    }

    /// Whether no operation or status write holds a button
    pub fn is_idle(&self) -> bool {
        self.operations.is_empty() && self.writes.is_empty() && self.early.is_empty()
    }

    /// Run `operation` on a background task
    pub fn spawn(
        self: &Arc<Self>,
        operation: OperationDescriptor,
        headers: FiwareHeaders,
    ) -> JoinHandle<OperationState> {
        let this = Arc::clone(self);
        let span = info_span!(
            "operation",
            button_id = %operation.button_id,
            service_id = %operation.service_id,
            action = %operation.action,
            correlator = headers.correlator.as_deref().unwrap_or_default(),
        );
        tokio::spawn(async move { this.run(operation, headers).await }.instrument(span))
    }

    /// Resolve, dispatch and notify. Returns the state the button was left in.
    pub async fn run(&self, operation: OperationDescriptor, headers: FiwareHeaders) -> OperationState {
        let _operation = self.operations.acquire(&operation.button_id).await;
        let button_id = operation.button_id.as_str();

        debug!(button_id, state = %OperationState::ResolvingService, "Operation started");
        let service = match self.resolver.resolve(&headers, &operation.service_id).await {
            Ok(service) => service,
            Err(e) => {
                warn!(button_id, service_id = %operation.service_id, error = %e, "Service resolution failed");
                let _write = self.writes.acquire(button_id).await;
                self.notifier.close(&headers, button_id, &e).await;
                return OperationState::Closed;
            }
        };

        if operation.action == OperationAction::Create {
            self.early.open(button_id);
        }
        debug!(button_id, state = %OperationState::Dispatching, endpoint = %service.target_url(), "Dispatching");
        let reply = self
            .transport
            .dispatch(&service, &operation, &self.callback_url, &headers)
            .await
            .and_then(check_status);

        let _write = self.writes.acquire(button_id).await;
        let state: OperationState = match operation.action {
            OperationAction::Synchronous => {
                let outcome = match reply {
                    Ok(response) => OperationOutcome::Success {
                        details: details_of(&response.body),
                    },
                    Err(e) => OperationOutcome::Failure(e),
                };
                self.notifier
                    .finish(&headers, button_id, &outcome, Vec::new())
                    .await
                    .into()
            }
            OperationAction::Create => {
                let early = self.early.take(button_id);
                match reply.and_then(external_id_of) {
                    Ok((external_id, details)) => {
                        let interaction_type = operation
                            .interaction_type
                            .unwrap_or(service.interaction_type);
                        self.start(&headers, button_id, &service, interaction_type, external_id, &details)
                            .await;
                        match early {
                            Some((payload, callback_headers)) => {
                                debug!(button_id, "Applying callback received before the create reply");
                                self.complete(&payload, &callback_headers, interaction_type)
                                    .await
                            }
                            None => OperationState::InProgress,
                        }
                    }
                    Err(e) => {
                        if early.is_some() {
                            warn!(button_id, "Dropping callback for a create that failed");
                        }
                        self.notifier
                            .finish(&headers, button_id, &OperationOutcome::Failure(e), Vec::new())
                            .await
                            .into()
                    }
                }
            }
        };

        info!(button_id, %state, "Operation finished");
        state
    }

    async fn start(
        &self,
        headers: &FiwareHeaders,
        button_id: &str,
        service: &ServiceDescriptor,
        interaction_type: InteractionType,
        external_id: String,
        details: &Map<String, Value>,
    ) {
        debug!(button_id, service_id = %service.id, %external_id, "Third party accepted operation");
        let request = self.notifier.status_update(
            button_id,
            OperationStatus::InProgress,
            &encode_details(details),
            vec![
                (ButtonAttribute::ExternalId, external_id),
                (
                    ButtonAttribute::InteractionType,
                    interaction_type.as_str().to_string(),
                ),
            ],
        );
        self.notifier.publish(headers, &request).await;
    }

    /// Complete an in-progress operation from a third-party callback.
    ///
    /// A callback that overtakes the reply to its create request is parked
    /// and applied right after the `in_progress` write; `Dispatching` is
    /// returned in that case. Fails with `BadInteractionType` when the
    /// button's interaction type cannot be read back; no status is written
    /// then.
    pub async fn handle_callback(
        &self,
        payload: CallbackPayload,
        headers: FiwareHeaders,
    ) -> AdapterResult<OperationState> {
        let _write = self.writes.acquire(&payload.button).await;

        let parked_id = payload.button.clone();
        let Some((payload, headers)) = self.early.park(payload, headers) else {
            info!(button_id = %parked_id, "Callback parked until the create reply arrives");
            return Ok(OperationState::Dispatching);
        };
        let button_id = payload.button.as_str();

        let interaction_type = self
            .button_interaction_type(&headers, button_id)
            .await
            .inspect_err(|e| warn!(button_id, error = %e, "Callback rejected"))?;

        let state = self.complete(&payload, &headers, interaction_type).await;
        info!(button_id, %state, "Callback handled");
        Ok(state)
    }

    /// Write the final status carried by a callback
    async fn complete(
        &self,
        payload: &CallbackPayload,
        headers: &FiwareHeaders,
        interaction_type: InteractionType,
    ) -> OperationState {
        let outcome = payload.outcome();
        let mut extra = Vec::new();
        if interaction_type == InteractionType::Synchronous
            && outcome.status() == OperationStatus::Completed
        {
            if let Some(value) = &payload.extra {
                extra.push((ButtonAttribute::OpExtra, value.clone()));
            }
        }

        self.notifier
            .finish(headers, &payload.button, &outcome, extra)
            .await
            .into()
    }

    async fn button_interaction_type(
        &self,
        headers: &FiwareHeaders,
        button_id: &str,
    ) -> AdapterResult<InteractionType> {
        let name = self.scheme.state_name(ButtonAttribute::InteractionType);
        let query = QueryContextRequest::single(button_id, self.scheme.button_type(), [name]);

        let body = self
            .broker
            .query_context(headers, &query)
            .await
            .map_err(|e| {
                AdapterError::BadInteractionType(format!(
                    "cannot read {} of button {}: {}",
                    name,
                    button_id,
                    e.message()
                ))
            })?;

        let value = body
            .context_responses
            .iter()
            .find(|r| r.context_element.id == button_id)
            .and_then(|r| attributes::get(&r.context_element.attributes, name))
            .and_then(value_text)
            .ok_or_else(|| {
                AdapterError::BadInteractionType(format!("button {} has no {}", button_id, name))
            })?;

        value.parse()
    }
}

/// Map a non-2xx reply to a third-party error
fn check_status(response: ThirdPartyResponse) -> AdapterResult<ThirdPartyResponse> {
    if response.is_success() {
        return Ok(response);
    }
    let message = response
        .body
        .get("message")
        .and_then(value_text)
        .or_else(|| value_text(&response.body))
        .unwrap_or_else(|| "unexpected status".to_string());
    Err(AdapterError::third_party(response.status.to_string(), message))
}

/// `details` object of a reply body, empty when absent
fn details_of(body: &Value) -> Map<String, Value> {
    body.get("details")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// External id and details of a successful create reply
fn external_id_of(response: ThirdPartyResponse) -> AdapterResult<(String, Map<String, Value>)> {
    let external_id = EXTERNAL_ID_FIELDS
        .iter()
        .filter_map(|field| response.body.get(*field))
        .filter_map(value_text)
        .find(|id| !id.is_empty())
        .ok_or_else(|| {
            AdapterError::third_party(
                response.status.to_string(),
                "create reply carries no external id",
            )
        })?;
    Ok((external_id, details_of(&response.body)))
}
