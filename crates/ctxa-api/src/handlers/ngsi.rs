//! NGSI handlers
//!
//! Both inbound flavours are acknowledged as soon as the payload is
//! validated; the operation itself runs on a background task. Business
//! failures travel inside the acknowledgement, the HTTP status is always 200.

use axum::body::Bytes;
use axum::extract::State;
use axum::{Extension, Json};
use ctxa_core::{
    compose_query_response, compose_update_response, AdapterError, AdapterMode, AdapterResult,
    FiwareHeaders, NgsiAck, OperationDescriptor,
};
use ctxa_orchestrator::OperationState;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::state::AppState;

/// Which inbound route a payload arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inbound {
    UpdateContext,
    Notification,
}

impl Inbound {
    fn route(self) -> &'static str {
        match self {
            Inbound::UpdateContext => "updateContext",
            Inbound::Notification => "notify",
        }
    }

    fn mode(self) -> AdapterMode {
        match self {
            Inbound::UpdateContext => AdapterMode::ContextProvider,
            Inbound::Notification => AdapterMode::Notification,
        }
    }
}

fn parse_body(body: &Bytes) -> AdapterResult<Value> {
    serde_json::from_slice(body)
        .map_err(|e| AdapterError::BadPayload(format!("body is not valid JSON: {}", e)))
}

fn check_mode(state: &AppState, route: &str, expected: AdapterMode) -> AdapterResult<()> {
    if state.mode() == expected {
        return Ok(());
    }
    Err(AdapterError::BadPayload(format!(
        "{} is served in {} mode, adapter runs in {} mode",
        route,
        expected,
        state.mode()
    )))
}

fn validate(state: &AppState, inbound: Inbound, payload: &Value) -> AdapterResult<OperationDescriptor> {
    check_mode(state, inbound.route(), inbound.mode())?;
    match inbound {
        Inbound::UpdateContext => state.validator().validate_update_context(payload),
        Inbound::Notification => state.validator().validate_notification(payload),
    }
}

fn accept(state: &AppState, inbound: Inbound, headers: FiwareHeaders, body: Bytes) -> NgsiAck {
    state.counter().increment();

    let payload = match parse_body(&body) {
        Ok(payload) => payload,
        Err(e) => return compose_update_response(Some(&e), &Value::Null),
    };

    debug!(route = inbound.route(), state = %OperationState::Validating, "Validating payload");
    match validate(state, inbound, &payload) {
        Ok(operation) => {
            info!(
                route = inbound.route(),
                button_id = %operation.button_id,
                service_id = %operation.service_id,
                action = %operation.action,
                correlator = headers.correlator.as_deref().unwrap_or_default(),
                "Operation accepted"
            );
            let button_id = operation.button_id.clone();
            let task = state.orchestrator().spawn(operation, headers);
            // The caller only waits for the acknowledgement
            tokio::spawn(async move {
                if let Err(e) = task.await {
                    error!(%button_id, error = %e, "Operation task failed");
                }
            });
            compose_update_response(None, &payload)
        }
        Err(e) => {
            debug!(route = inbound.route(), error = %e, "Operation rejected");
            compose_update_response(Some(&e), &payload)
        }
    }
}

/// POST {base}/updateContext
pub async fn update_context(
    State(state): State<AppState>,
    Extension(headers): Extension<FiwareHeaders>,
    body: Bytes,
) -> Json<NgsiAck> {
    Json(accept(&state, Inbound::UpdateContext, headers, body))
}

/// POST {base}/notify
pub async fn notify(
    State(state): State<AppState>,
    Extension(headers): Extension<FiwareHeaders>,
    body: Bytes,
) -> Json<NgsiAck> {
    Json(accept(&state, Inbound::Notification, headers, body))
}

/// POST {base}/queryContext
///
/// The adapter keeps no attribute state, so a context-provider query is
/// answered with empty values for the requested attributes.
pub async fn query_context(
    State(state): State<AppState>,
    Extension(_headers): Extension<FiwareHeaders>,
    body: Bytes,
) -> Json<NgsiAck> {
    state.counter().increment();

    let ack = parse_body(&body)
        .and_then(|query| {
            check_mode(&state, "queryContext", AdapterMode::ContextProvider)?;
            Ok(compose_query_response(&query))
        })
        .unwrap_or_else(|e| {
            debug!(error = %e, "Query rejected");
            compose_update_response(Some(&e), &Value::Null)
        });
    Json(ack)
}
