//! Inbound request validation
//!
//! Both the context-provider updateContext and the notification payloads
//! carry a single button element. Validation accumulates every violation it
//! finds so operators see the full list in one `BAD_PAYLOAD` message.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::attributes::{self, AttributeMap, EntityKind};
use crate::error::{AdapterError, AdapterResult};
use crate::models::{Attribute, InteractionType, OperationAction, OperationDescriptor, OperationStatus};
use crate::scheme::{AdapterMode, ButtonAttribute, EntityAttributeScheme};

/// Accepted forms of `isPattern`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternRule {
    /// Exactly the string `"false"`
    StringFalse,
    /// `"false"` or boolean `false`
    StringOrBoolFalse,
}

#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn push(&mut self, field: impl AsRef<str>, reason: impl AsRef<str>) {
        self.0.push(format!("{}: {}", field.as_ref(), reason.as_ref()));
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn into_error(self, payload: &Value) -> AdapterError {
        AdapterError::BadPayload(format!("{} [{}]", payload, self.0.join("; ")))
    }
}

/// A button element that passed shape validation
struct ParsedElement {
    descriptor: OperationDescriptor,
    status: Option<String>,
}

/// Validates inbound update/notification payloads against the configured
/// [`EntityAttributeScheme`].
#[derive(Debug, Clone)]
pub struct RequestValidator {
    scheme: Arc<EntityAttributeScheme>,
}

impl RequestValidator {
    pub fn new(scheme: Arc<EntityAttributeScheme>) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> &EntityAttributeScheme {
        &self.scheme
    }

    /// Validate a context-provider `updateContext` body
    pub fn validate_update_context(&self, payload: &Value) -> AdapterResult<OperationDescriptor> {
        let mut violations = Violations::default();

        let element = match payload.get("contextElements") {
            Some(Value::Array(elements)) if elements.len() == 1 => Some(&elements[0]),
            Some(Value::Array(elements)) => {
                violations.push(
                    "contextElements",
                    format!("expected exactly one element, found {}", elements.len()),
                );
                None
            }
            Some(_) => {
                violations.push("contextElements", "is not an array");
                None
            }
            None => {
                violations.push("contextElements", "is missing");
                None
            }
        };

        let parsed = element.and_then(|e| {
            self.check_element(e, "contextElements[0]", PatternRule::StringFalse, &mut violations)
        });

        self.finish(payload, violations, parsed)
    }

    /// Validate a notification body (`contextResponses[].contextElement`)
    pub fn validate_notification(&self, payload: &Value) -> AdapterResult<OperationDescriptor> {
        let mut violations = Violations::default();

        let element = match payload.get("contextResponses") {
            Some(Value::Array(responses)) if responses.len() == 1 => {
                match responses[0].get("contextElement") {
                    Some(element) => Some(element),
                    None => {
                        violations.push("contextResponses[0].contextElement", "is missing");
                        None
                    }
                }
            }
            Some(Value::Array(responses)) => {
                violations.push(
                    "contextResponses",
                    format!("expected exactly one response, found {}", responses.len()),
                );
                None
            }
            Some(_) => {
                violations.push("contextResponses", "is not an array");
                None
            }
            None => {
                violations.push("contextResponses", "is missing");
                None
            }
        };

        let parsed = element.and_then(|e| {
            self.check_element(
                e,
                "contextResponses[0].contextElement",
                PatternRule::StringOrBoolFalse,
                &mut violations,
            )
        });

        self.finish(payload, violations, parsed)
    }

    fn finish(
        &self,
        payload: &Value,
        violations: Violations,
        parsed: Option<ParsedElement>,
    ) -> AdapterResult<OperationDescriptor> {
        let parsed = match parsed {
            Some(parsed) if violations.is_empty() => parsed,
            _ => {
                debug!(violations = violations.0.len(), "Rejecting inbound payload");
                return Err(violations.into_error(payload));
            }
        };

        if self.scheme.mode() == AdapterMode::Notification {
            let status = parsed.status.unwrap_or_default();
            if OperationStatus::parse(&status) != Some(OperationStatus::Pending) {
                return Err(AdapterError::BadOperationStatus {
                    button_id: parsed.descriptor.button_id,
                    status,
                });
            }
        }

        Ok(parsed.descriptor)
    }

    fn check_element(
        &self,
        element: &Value,
        path: &str,
        pattern_rule: PatternRule,
        violations: &mut Violations,
    ) -> Option<ParsedElement> {
        let id = match element.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => Some(id.to_string()),
            Some(_) => {
                violations.push(format!("{}.id", path), "is empty");
                None
            }
            None => {
                violations.push(format!("{}.id", path), "is missing");
                None
            }
        };

        match element.get("type").and_then(Value::as_str) {
            Some(t) if t == self.scheme.button_type() => {}
            Some(t) => violations.push(
                format!("{}.type", path),
                format!("expected '{}', found '{}'", self.scheme.button_type(), t),
            ),
            None => violations.push(format!("{}.type", path), "is missing"),
        }

        match (element.get("isPattern"), pattern_rule) {
            (None, _) => violations.push(format!("{}.isPattern", path), "is missing"),
            (Some(Value::String(s)), _) if s == "false" => {}
            (Some(Value::Bool(false)), PatternRule::StringOrBoolFalse) => {}
            (Some(other), _) => violations.push(
                format!("{}.isPattern", path),
                format!("expected 'false', found {}", other),
            ),
        }

        let attrs = self.parse_attributes(element, path, violations)?;

        let declared = self.scheme.request_attributes();
        let map = AttributeMap::extract(&attrs, &declared);
        for name in map.missing() {
            violations.push(format!("{}.attributes", path), format!("{} is missing", name));
        }

        let action = map
            .text(ButtonAttribute::OpAction)
            .and_then(|a| OperationAction::parse(&a));

        // Only a synchronous action may omit the interaction type
        if !map.contains(ButtonAttribute::InteractionType)
            && matches!(action, Some(OperationAction::Create))
        {
            violations.push(
                format!("{}.attributes", path),
                format!(
                    "{} is missing",
                    self.scheme.request_name(ButtonAttribute::InteractionType)
                ),
            );
        }

        for violation in attributes::conformance_violations(EntityKind::Button, &attrs, &self.scheme) {
            violations.push(format!("{}.attributes", path), violation);
        }

        let interaction_type = map
            .text(ButtonAttribute::InteractionType)
            .and_then(|t| t.parse::<InteractionType>().ok());

        Some(ParsedElement {
            descriptor: OperationDescriptor {
                button_id: id?,
                interaction_type,
                service_id: map.text(ButtonAttribute::ServiceId)?,
                action: action?,
                extra: map.text(ButtonAttribute::OpExtra)?,
            },
            status: map.text(ButtonAttribute::OpStatus),
        })
    }

    fn parse_attributes(
        &self,
        element: &Value,
        path: &str,
        violations: &mut Violations,
    ) -> Option<Vec<Attribute>> {
        let raw = match element.get("attributes") {
            Some(Value::Array(raw)) => raw,
            Some(_) => {
                violations.push(format!("{}.attributes", path), "is not an array");
                return None;
            }
            None => {
                violations.push(format!("{}.attributes", path), "is missing");
                return None;
            }
        };

        let mut attrs = Vec::with_capacity(raw.len());
        for (index, attr) in raw.iter().enumerate() {
            match attr.get("name").and_then(Value::as_str) {
                Some(name) => attrs.push(Attribute::new(
                    name,
                    attr.get("type").and_then(Value::as_str).unwrap_or("string"),
                    attr.get("value").cloned().unwrap_or(Value::Null),
                )),
                None => violations.push(format!("{}.attributes[{}].name", path, index), "is missing"),
            }
        }
        Some(attrs)
    }
}
