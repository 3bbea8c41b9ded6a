//! NGSI acknowledgements returned to the original caller

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AdapterError;
use crate::models::StatusCode;

/// One acknowledged element. The element is echoed verbatim, even when it
/// failed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckEntry {
    pub context_element: Value,
    pub status_code: StatusCode,
}

/// `{contextResponses: [...]}` acknowledgement body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NgsiAck {
    pub context_responses: Vec<AckEntry>,
}

impl NgsiAck {
    /// Status of the first entry
    pub fn first_status(&self) -> Option<&StatusCode> {
        self.context_responses.first().map(|e| &e.status_code)
    }
}

/// Elements carried by an update (`contextElements`) or a notification
/// (`contextResponses[].contextElement`)
fn original_elements(original: &Value) -> Vec<Value> {
    if let Some(elements) = original.get("contextElements").and_then(Value::as_array) {
        return elements.clone();
    }
    original
        .get("contextResponses")
        .and_then(Value::as_array)
        .map(|responses| {
            responses
                .iter()
                .filter_map(|r| r.get("contextElement").cloned())
                .collect()
        })
        .unwrap_or_default()
}

/// Build the acknowledgement for an update or notification.
///
/// Every element gets `200 OK` when `err` is `None`, otherwise
/// `400 "<code> - <message>"`. A payload without elements still yields one
/// entry so the caller sees the status.
pub fn compose_update_response(err: Option<&AdapterError>, original: &Value) -> NgsiAck {
    let status = match err {
        None => StatusCode::ok(),
        Some(err) => StatusCode::bad_request(err.reason_phrase()),
    };

    let mut elements = original_elements(original);
    if elements.is_empty() {
        elements.push(json!({}));
    }

    NgsiAck {
        context_responses: elements
            .into_iter()
            .map(|context_element| AckEntry {
                context_element,
                status_code: status.clone(),
            })
            .collect(),
    }
}

/// Build the acknowledgement for a context-provider queryContext.
///
/// The adapter holds no state of its own, so every requested attribute is
/// answered with an empty value.
pub fn compose_query_response(query: &Value) -> NgsiAck {
    let attributes: Vec<Value> = query
        .get("attributes")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(|name| json!({"name": name, "type": "string", "value": ""}))
                .collect()
        })
        .unwrap_or_default();

    let entities = query
        .get("entities")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if entities.is_empty() {
        return compose_update_response(
            Some(&AdapterError::BadPayload(format!(
                "{} [entities: is missing]",
                query
            ))),
            &Value::Null,
        );
    }

    NgsiAck {
        context_responses: entities
            .into_iter()
            .map(|entity| AckEntry {
                context_element: json!({
                    "id": entity.get("id").cloned().unwrap_or(Value::Null),
                    "type": entity.get("type").cloned().unwrap_or(Value::Null),
                    "isPattern": entity.get("isPattern").cloned().unwrap_or(json!("false")),
                    "attributes": attributes.clone(),
                }),
                status_code: StatusCode::ok(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ok_ack_echoes_each_element() {
        let original = json!({
            "contextElements": [
                {"id": "btn1", "type": "button", "isPattern": "false", "attributes": []}
            ],
            "updateAction": "UPDATE"
        });
        let ack = compose_update_response(None, &original);
        assert_eq!(
            serde_json::to_value(&ack).unwrap(),
            json!({
                "contextResponses": [{
                    "contextElement": {"id": "btn1", "type": "button", "isPattern": "false", "attributes": []},
                    "statusCode": {"code": "200", "reasonPhrase": "OK"}
                }]
            })
        );
    }

    #[test]
    fn error_ack_carries_reason_phrase() {
        let err = AdapterError::BadPayload("bad".to_string());
        let ack = compose_update_response(Some(&err), &json!({"contextElements": [{"id": "b"}]}));
        let status = ack.first_status().unwrap();
        assert_eq!(status.code, "400");
        assert_eq!(status.reason_phrase, "BAD_PAYLOAD - bad");
    }

    #[test]
    fn notification_elements_are_echoed() {
        let original = json!({
            "contextResponses": [
                {"contextElement": {"id": "btn1"}, "statusCode": {"code": "200"}}
            ]
        });
        let ack = compose_update_response(None, &original);
        assert_eq!(ack.context_responses[0].context_element, json!({"id": "btn1"}));
    }

    #[test]
    fn empty_payload_still_reports_status() {
        let err = AdapterError::BadPayload("empty".to_string());
        let ack = compose_update_response(Some(&err), &json!({}));
        assert_eq!(ack.context_responses.len(), 1);
        assert_eq!(ack.context_responses[0].context_element, json!({}));
    }

    #[test]
    fn query_ack_lists_requested_attributes() {
        let query = json!({
            "entities": [{"id": "btn1", "type": "button", "isPattern": "false"}],
            "attributes": ["aux_op_status"]
        });
        let ack = compose_query_response(&query);
        let element = &ack.context_responses[0].context_element;
        assert_eq!(element["attributes"][0]["name"], "aux_op_status");
        assert_eq!(element["attributes"][0]["value"], "");
        assert!(ack.first_status().unwrap().is_ok());
    }
}
