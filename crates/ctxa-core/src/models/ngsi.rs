//! NGSI v1 wire models (context elements, attributes, status codes)

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One `{name, type, value}` attribute of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type", default)]
    pub attr_type: String,
    #[serde(default)]
    pub value: Value,
}

impl Attribute {
    /// Create an attribute with an explicit NGSI type
    pub fn new(name: impl Into<String>, attr_type: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            attr_type: attr_type.into(),
            value: value.into(),
        }
    }

    /// Create a `string`-typed attribute
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, "string", Value::String(value.into()))
    }
}

/// An NGSI entity with its attribute list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextElement {
    pub id: String,
    #[serde(rename = "type", default)]
    pub entity_type: String,
    #[serde(default = "pattern_false", deserialize_with = "string_or_scalar")]
    pub is_pattern: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl ContextElement {
    /// Create a non-pattern element
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            is_pattern: pattern_false(),
            attributes: Vec::new(),
        }
    }

    /// Builder-style attribute append
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }
}

/// NGSI status code (`code` is carried as a string on the wire)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCode {
    #[serde(deserialize_with = "string_or_scalar")]
    pub code: String,
    #[serde(default)]
    pub reason_phrase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl StatusCode {
    pub fn ok() -> Self {
        Self {
            code: "200".to_string(),
            reason_phrase: "OK".to_string(),
            details: None,
        }
    }

    pub fn bad_request(reason_phrase: impl Into<String>) -> Self {
        Self {
            code: "400".to_string(),
            reason_phrase: reason_phrase.into(),
            details: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == "200"
    }
}

/// One entry of a `contextResponses` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextResponse {
    pub context_element: ContextElement,
    pub status_code: StatusCode,
}

/// Broker reply to queryContext/updateContext.
///
/// Either `contextResponses` is populated or the broker answered with an
/// `errorCode` envelope (which it does with HTTP 200).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextResponseBody {
    #[serde(default)]
    pub context_responses: Vec<ContextResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<StatusCode>,
}

/// Write mode of an updateContext request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpdateAction {
    Update,
    Append,
    Delete,
}

/// Body of an updateContext request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContextRequest {
    pub context_elements: Vec<ContextElement>,
    pub update_action: UpdateAction,
}

/// Entity reference inside a queryContext request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default = "pattern_false", deserialize_with = "string_or_scalar")]
    pub is_pattern: String,
}

/// Body of a queryContext request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContextRequest {
    pub entities: Vec<EntityRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
}

impl QueryContextRequest {
    /// Query a single non-pattern entity for the named attributes
    pub fn single(
        id: impl Into<String>,
        entity_type: impl Into<String>,
        attributes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            entities: vec![EntityRef {
                id: id.into(),
                entity_type: entity_type.into(),
                is_pattern: pattern_false(),
            }],
            attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }
}

fn pattern_false() -> String {
    "false".to_string()
}

/// Brokers are loose about scalars: `isPattern` can be `false` or `"false"`,
/// status codes can be `200` or `"200"`.
fn string_or_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string, boolean or number, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn element_accepts_boolean_is_pattern() {
        let element: ContextElement = serde_json::from_value(json!({
            "id": "btn1",
            "type": "BlackButton",
            "isPattern": false,
            "attributes": []
        }))
        .unwrap();
        assert_eq!(element.is_pattern, "false");
    }

    #[test]
    fn error_envelope_parses() {
        let body: ContextResponseBody = serde_json::from_value(json!({
            "errorCode": {"code": 404, "reasonPhrase": "No context element found"}
        }))
        .unwrap();
        assert!(body.context_responses.is_empty());
        assert_eq!(body.error_code.unwrap().code, "404");
    }

    #[test]
    fn update_request_serializes_ngsi_names() {
        let request = UpdateContextRequest {
            context_elements: vec![ContextElement::new("btn1", "BlackButton")
                .with_attribute(Attribute::string("op_status", "closed"))],
            update_action: UpdateAction::Append,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["updateAction"], "APPEND");
        assert_eq!(value["contextElements"][0]["isPattern"], "false");
        assert_eq!(value["contextElements"][0]["attributes"][0]["type"], "string");
    }
}
