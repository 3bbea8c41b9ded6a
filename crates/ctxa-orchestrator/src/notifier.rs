//! Button status write-back
//!
//! Every orchestration branch ends in exactly one call to [`Notifier::publish`].
//! Status attributes always use their unprefixed names, so in
//! context-provider mode the write never routes back to the adapter.

use std::sync::Arc;

use ctxa_core::{
    AdapterError, Attribute, ButtonAttribute, ContextBroker, ContextElement,
    EntityAttributeScheme, FiwareHeaders, OperationOutcome, OperationStatus,
    UpdateAction, UpdateContextRequest,
};
use tracing::{info, warn};

#[derive(Clone)]
pub struct Notifier {
    broker: Arc<dyn ContextBroker>,
    scheme: Arc<EntityAttributeScheme>,
}

impl Notifier {
    pub fn new(broker: Arc<dyn ContextBroker>, scheme: Arc<EntityAttributeScheme>) -> Self {
        Self { broker, scheme }
    }

    /// APPEND request setting `op_status`, `op_result` and any `extra`
    /// attributes on the button
    pub fn status_update(
        &self,
        button_id: &str,
        status: OperationStatus,
        result: &str,
        extra: Vec<(ButtonAttribute, String)>,
    ) -> UpdateContextRequest {
        let name = |attr: ButtonAttribute| self.scheme.state_name(attr);
        let mut element = ContextElement::new(button_id, self.scheme.button_type())
            .with_attribute(Attribute::string(
                name(ButtonAttribute::OpStatus),
                status.as_str(),
            ))
            .with_attribute(Attribute::string(name(ButtonAttribute::OpResult), result));
        for (attr, value) in extra {
            element = element.with_attribute(Attribute::string(name(attr), value));
        }

        UpdateContextRequest {
            context_elements: vec![element],
            update_action: UpdateAction::Append,
        }
    }

    /// Send `request`; failures are logged and dropped. Returns whether the
    /// broker accepted it.
    pub async fn publish(&self, headers: &FiwareHeaders, request: &UpdateContextRequest) -> bool {
        let button_id = request
            .context_elements
            .first()
            .map(|e| e.id.as_str())
            .unwrap_or_default();

        match self.broker.update_context(headers, request).await {
            Ok(_) => {
                info!(button_id, "Button status updated");
                true
            }
            Err(e) => {
                warn!(button_id, error = %e, "Button status update failed, dropping");
                false
            }
        }
    }

    /// Publish the terminal status of `outcome` with optional extra attributes
    pub async fn finish(
        &self,
        headers: &FiwareHeaders,
        button_id: &str,
        outcome: &OperationOutcome,
        extra: Vec<(ButtonAttribute, String)>,
    ) -> OperationStatus {
        let status = outcome.status();
        let request = self.status_update(button_id, status, &outcome.encode_result(), extra);
        self.publish(headers, &request).await;
        status
    }

    /// Close the operation on `button_id` with `err`
    pub async fn close(&self, headers: &FiwareHeaders, button_id: &str, err: &AdapterError) {
        let request = self.status_update(
            button_id,
            OperationStatus::Closed,
            &err.encode_result(),
            Vec::new(),
        );
        self.publish(headers, &request).await;
    }
}
