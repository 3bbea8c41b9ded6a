//! Service entity lookup
//!
//! Fetches the service entity a button points at and turns it into a typed
//! [`ServiceDescriptor`]. Broker failures pass through unchanged; a reply
//! that arrives but is not a usable descriptor is a `BadService`.

use std::sync::Arc;

use ctxa_core::attributes::value_text;
use ctxa_core::{
    AdapterError, AdapterResult, AttributeMap, ContextBroker, ContextResponseBody,
    EntityAttributeScheme, FiwareHeaders, InteractionType, Mapping, QueryContextRequest,
    ServiceAttribute, ServiceDescriptor,
};
use serde_json::Value;
use tracing::{debug, instrument, warn};

#[derive(Clone)]
pub struct ServiceResolver {
    broker: Arc<dyn ContextBroker>,
    scheme: Arc<EntityAttributeScheme>,
}

impl ServiceResolver {
    pub fn new(broker: Arc<dyn ContextBroker>, scheme: Arc<EntityAttributeScheme>) -> Self {
        Self { broker, scheme }
    }

    /// Query the broker for `service_id` and validate the reply
    #[instrument(skip(self, headers), fields(service = %headers.service))]
    pub async fn resolve(
        &self,
        headers: &FiwareHeaders,
        service_id: &str,
    ) -> AdapterResult<ServiceDescriptor> {
        let query = QueryContextRequest::single(
            service_id,
            self.scheme.service_type(),
            ServiceAttribute::ALL.iter().map(|attr| attr.name()),
        );

        let body = self.broker.query_context(headers, &query).await?;
        if let Some(error_code) = &body.error_code {
            return Err(AdapterError::broker(
                error_code.code.clone(),
                format!("service {} lookup failed: {}", service_id, error_code.reason_phrase),
            ));
        }

        let descriptor = descriptor_from(service_id, &self.scheme, &body)
            .inspect_err(|e| warn!(error = %e, "Service entity rejected"))?;
        debug!(
            interaction_type = %descriptor.interaction_type,
            endpoint = %descriptor.endpoint,
            "Service resolved"
        );
        Ok(descriptor)
    }
}

/// Build a descriptor from a queryContext reply for `service_id`
pub fn descriptor_from(
    service_id: &str,
    scheme: &EntityAttributeScheme,
    body: &ContextResponseBody,
) -> AdapterResult<ServiceDescriptor> {
    let service_type = scheme.service_type();
    let bad = |reason: String| AdapterError::bad_service(service_id, reason);

    let response = match body.context_responses.as_slice() {
        [only] => only,
        [] => return Err(bad("no context element returned".to_string())),
        many => {
            return Err(bad(format!(
                "expected one context element, got {}",
                many.len()
            )))
        }
    };
    let element = &response.context_element;

    if element.id != service_id {
        return Err(bad(format!("reply is for entity '{}'", element.id)));
    }
    if element.entity_type != service_type {
        return Err(bad(format!(
            "entity type '{}' is not '{}'",
            element.entity_type, service_type
        )));
    }
    if element.is_pattern != "false" {
        return Err(bad(format!("isPattern is '{}'", element.is_pattern)));
    }

    let attrs = AttributeMap::extract(&element.attributes, &scheme.service_attributes());
    if !attrs.is_complete() {
        return Err(bad(format!(
            "missing attributes: {}",
            attrs.missing().join(", ")
        )));
    }

    let text = |key: ServiceAttribute| attrs.text(key).unwrap_or_default();

    let interaction_type = text(ServiceAttribute::InteractionType)
        .parse::<InteractionType>()
        .map_err(|e| bad(e.message()))?;

    let endpoint = text(ServiceAttribute::Endpoint);
    if endpoint.is_empty() {
        return Err(bad("endpoint is empty".to_string()));
    }
    let method = text(ServiceAttribute::Method);
    if method.is_empty() {
        return Err(bad("method is empty".to_string()));
    }

    let mapping = attrs
        .get(ServiceAttribute::Mapping)
        .map(parse_mapping)
        .transpose()
        .map_err(bad)?
        .unwrap_or_default();

    let timeout_ms = attrs
        .get(ServiceAttribute::Timeout)
        .map(parse_timeout)
        .transpose()
        .map_err(bad)?
        .unwrap_or_default();

    Ok(ServiceDescriptor {
        id: service_id.to_string(),
        provider: attrs
            .get(ServiceAttribute::Provider)
            .and_then(value_text)
            .filter(|p| !p.is_empty()),
        interaction_type,
        endpoint,
        method,
        authentication: attrs
            .get(ServiceAttribute::Authentication)
            .filter(|v| !v.is_null())
            .cloned(),
        mapping,
        timeout_ms,
    })
}

/// `mapping` is an object, or a string holding a JSON object
fn parse_mapping(value: &Value) -> Result<Mapping, String> {
    let decoded;
    let object = match value {
        Value::Object(_) => value,
        Value::String(s) => {
            decoded = serde_json::from_str::<Value>(s)
                .map_err(|e| format!("mapping is not valid JSON: {}", e))?;
            &decoded
        }
        other => return Err(format!("mapping must be an object, got {}", other)),
    };
    if !object.is_object() {
        return Err(format!("mapping must be an object, got {}", object));
    }
    serde_json::from_value(object.clone()).map_err(|e| format!("invalid mapping: {}", e))
}

/// `timeout` is a non-negative integer, as a number or numeric string
fn parse_timeout(value: &Value) -> Result<u64, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| format!("timeout '{}' is not a non-negative integer", n)),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("timeout '{}' is not a non-negative integer", s)),
        other => Err(format!("timeout must be an integer, got {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{entity_reply, service_reply, RecordingBroker};
    use ctxa_core::{AdapterMode, Attribute, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn scheme(service_type: &str) -> EntityAttributeScheme {
        EntityAttributeScheme::new(AdapterMode::ContextProvider, "BlackButton", service_type)
    }

    fn resolver(broker: Arc<RecordingBroker>) -> ServiceResolver {
        ServiceResolver::new(broker, Arc::new(scheme("service")))
    }

    fn headers() -> FiwareHeaders {
        FiwareHeaders::new("blackbutton", "/")
    }

    #[tokio::test]
    async fn resolves_complete_service() {
        let broker = Arc::new(RecordingBroker::default());
        broker.reply("svc1", Ok(service_reply("svc1", "synchronous", "http://svc")));

        let descriptor = resolver(broker.clone()).resolve(&headers(), "svc1").await.unwrap();
        assert_eq!(descriptor.interaction_type, InteractionType::Synchronous);
        assert_eq!(descriptor.target_url(), "http://svc/jobs");
        assert_eq!(descriptor.timeout_ms, 2000);
        assert_eq!(descriptor.provider.as_deref(), Some("acme"));

        let query = &broker.queries()[0];
        assert_eq!(query.entities[0].entity_type, "service");
        assert_eq!(query.attributes.len(), 7);
    }

    #[tokio::test]
    async fn broker_errors_pass_through() {
        let broker = Arc::new(RecordingBroker::default());
        let err = resolver(broker).resolve(&headers(), "missing").await.unwrap_err();
        assert_eq!(err.code(), "BROKER_ERROR");
    }

    #[tokio::test]
    async fn error_envelope_is_broker_error() {
        let broker = Arc::new(RecordingBroker::default());
        broker.reply(
            "svc1",
            Ok(ContextResponseBody {
                context_responses: vec![],
                error_code: Some(StatusCode {
                    code: "404".to_string(),
                    reason_phrase: "No context element found".to_string(),
                    details: None,
                }),
            }),
        );
        let err = resolver(broker).resolve(&headers(), "svc1").await.unwrap_err();
        assert_eq!(err.code(), "BROKER_ERROR");
        assert!(err.message().contains("No context element found"));
    }

    #[test]
    fn missing_required_attribute_is_bad_service() {
        let body = entity_reply(
            "svc1",
            "service",
            vec![
                Attribute::string("interaction_type", "synchronous"),
                Attribute::string("endpoint", "http://svc"),
                Attribute::string("method", "GET"),
                Attribute::string("timeout", "100"),
            ],
        );
        let err = descriptor_from("svc1", &scheme("service"), &body).unwrap_err();
        assert_eq!(err.code(), "BAD_SERVICE");
        assert!(err.message().contains("mapping"));
    }

    #[test]
    fn optional_attributes_may_be_absent() {
        let body = entity_reply(
            "svc1",
            "service",
            vec![
                Attribute::string("interaction_type", "ASYNCHRONOUS"),
                Attribute::string("endpoint", "http://svc"),
                Attribute::string("method", "post"),
                Attribute::string("mapping", r#"{"path": "/x"}"#),
                Attribute::new("timeout", "integer", json!(500)),
            ],
        );
        let descriptor = descriptor_from("svc1", &scheme("service"), &body).unwrap();
        assert_eq!(descriptor.interaction_type, InteractionType::Asynchronous);
        assert_eq!(descriptor.mapping.path.as_deref(), Some("/x"));
        assert_eq!(descriptor.provider, None);
        assert_eq!(descriptor.authentication, None);
    }

    #[test]
    fn shape_mismatches_are_bad_service() {
        let wrong_type = service_reply("svc1", "synchronous", "http://svc");
        assert!(descriptor_from("svc1", &scheme("other"), &wrong_type).is_err());

        let wrong_id = service_reply("svc2", "synchronous", "http://svc");
        assert!(descriptor_from("svc1", &scheme("service"), &wrong_id).is_err());

        let mut pattern = service_reply("svc1", "synchronous", "http://svc");
        pattern.context_responses[0].context_element.is_pattern = "true".to_string();
        assert!(descriptor_from("svc1", &scheme("service"), &pattern).is_err());

        let empty = ContextResponseBody::default();
        assert_eq!(
            descriptor_from("svc1", &scheme("service"), &empty).unwrap_err().code(),
            "BAD_SERVICE"
        );
    }

    #[test]
    fn bad_values_are_bad_service() {
        let mut body = service_reply("svc1", "later", "http://svc");
        assert_eq!(
            descriptor_from("svc1", &scheme("service"), &body).unwrap_err().code(),
            "BAD_SERVICE"
        );

        body = service_reply("svc1", "synchronous", "http://svc");
        ctxa_core::attributes::set(
            &mut body.context_responses[0].context_element.attributes,
            "timeout",
            "soon",
        );
        assert!(descriptor_from("svc1", &scheme("service"), &body).is_err());

        body = service_reply("svc1", "synchronous", "http://svc");
        ctxa_core::attributes::set(
            &mut body.context_responses[0].context_element.attributes,
            "mapping",
            json!([1, 2]),
        );
        assert!(descriptor_from("svc1", &scheme("service"), &body).is_err());
    }
}
