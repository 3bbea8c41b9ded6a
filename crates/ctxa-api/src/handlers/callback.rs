//! Third-party callback webhook

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use ctxa_core::FiwareHeaders;
use ctxa_orchestrator::CallbackPayload;
use tracing::{debug, error, warn};

use crate::state::AppState;

/// POST {base}{callback}
///
/// Always answers 200 with an empty body; problems are only logged since
/// the third party has no use for them.
pub async fn callback(
    State(state): State<AppState>,
    Extension(headers): Extension<FiwareHeaders>,
    body: Bytes,
) -> StatusCode {
    state.counter().increment();

    let payload: CallbackPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed callback");
            return StatusCode::OK;
        }
    };

    let button_id = payload.button.clone();
    // Runs on its own task so a third party hanging up cannot cancel the write
    let orchestrator = state.orchestrator().clone();
    let task = tokio::spawn(async move { orchestrator.handle_callback(payload, headers).await });
    match task.await {
        Ok(Ok(outcome)) => debug!(%button_id, state = %outcome, "Callback processed"),
        Ok(Err(e)) => warn!(%button_id, error = %e, "Callback not processed"),
        Err(e) => error!(%button_id, error = %e, "Callback task failed"),
    }
    StatusCode::OK
}
