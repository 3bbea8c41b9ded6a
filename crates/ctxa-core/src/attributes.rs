//! Attribute codec for NGSI entities
//!
//! Plain functions over an entity's attribute list, plus [`AttributeMap`]
//! which extracts a declared set of attributes in one pass.
//!
//! Attribute names are not unique on the wire; lookups use the first match.

use std::collections::HashMap;
use std::hash::Hash;

use serde_json::Value;

use crate::models::{Attribute, InteractionType, OperationAction};
use crate::scheme::{ButtonAttribute, EntityAttributeScheme, ServiceAttribute};

/// Value of the first attribute named `name`
pub fn get<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a Value> {
    attrs.iter().find(|a| a.name == name).map(|a| &a.value)
}

/// Whether an attribute named `name` exists
pub fn has(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|a| a.name == name)
}

/// Replace the value of the first attribute named `name`.
///
/// Returns `false` (and leaves the list untouched) when there is no such
/// attribute.
pub fn set(attrs: &mut [Attribute], name: &str, value: impl Into<Value>) -> bool {
    match attrs.iter_mut().find(|a| a.name == name) {
        Some(attr) => {
            attr.value = value.into();
            true
        }
        None => false,
    }
}

/// Remove every attribute named `name`, returning how many were removed
pub fn remove(attrs: &mut Vec<Attribute>, name: &str) -> usize {
    let before = attrs.len();
    attrs.retain(|a| a.name != name);
    before - attrs.len()
}

/// Textual form of an attribute value.
///
/// Strings are returned as-is, other scalars and objects in their JSON
/// form; `null` has no text.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Entity kinds with enumerated value rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Button,
    Service,
}

/// Business-rule violations of attribute values, as `"<name>: <reason>"`.
///
/// Absent attributes are not violations here; presence is checked
/// separately.
pub fn conformance_violations(
    kind: EntityKind,
    attrs: &[Attribute],
    scheme: &EntityAttributeScheme,
) -> Vec<String> {
    let mut violations = Vec::new();

    let interaction_name = match kind {
        EntityKind::Button => {
            let action_name = scheme.request_name(ButtonAttribute::OpAction);
            if let Some(value) = get(attrs, &action_name) {
                let text = value_text(value).unwrap_or_default();
                if OperationAction::parse(&text).is_none() {
                    violations.push(format!(
                        "{}: value '{}' is not one of {}",
                        action_name,
                        text,
                        OperationAction::ALLOWED.join(", ")
                    ));
                }
            }
            scheme.request_name(ButtonAttribute::InteractionType)
        }
        EntityKind::Service => ServiceAttribute::InteractionType.name().to_string(),
    };

    if let Some(value) = get(attrs, &interaction_name) {
        let text = value_text(value).unwrap_or_default();
        if text.parse::<InteractionType>().is_err() {
            violations.push(format!(
                "{}: value '{}' is not one of synchronous, asynchronous",
                interaction_name, text
            ));
        }
    }

    violations
}

/// Whether attribute values satisfy the enumerated rules for `kind`
pub fn values_conform(kind: EntityKind, attrs: &[Attribute], scheme: &EntityAttributeScheme) -> bool {
    conformance_violations(kind, attrs, scheme).is_empty()
}

/// Declaration of one attribute to extract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSpec<K> {
    pub key: K,
    pub name: String,
    pub required: bool,
}

impl<K> AttributeSpec<K> {
    pub fn required(key: K, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            required: true,
        }
    }

    pub fn optional(key: K, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            required: false,
        }
    }
}

/// Declared attributes extracted from an attribute list, keyed by a typed
/// attribute identifier instead of a wire name.
#[derive(Debug, Clone)]
pub struct AttributeMap<K> {
    values: HashMap<K, Value>,
    missing: Vec<String>,
}

impl<K: Copy + Eq + Hash> AttributeMap<K> {
    /// Extract `declared` from `attrs`, recording required names that are absent
    pub fn extract(attrs: &[Attribute], declared: &[AttributeSpec<K>]) -> Self {
        let mut values = HashMap::with_capacity(declared.len());
        let mut missing = Vec::new();

        for spec in declared {
            match get(attrs, &spec.name) {
                Some(value) => {
                    values.insert(spec.key, value.clone());
                }
                None if spec.required => missing.push(spec.name.clone()),
                None => {}
            }
        }

        Self { values, missing }
    }

    pub fn get(&self, key: K) -> Option<&Value> {
        self.values.get(&key)
    }

    pub fn text(&self, key: K) -> Option<String> {
        self.values.get(&key).and_then(value_text)
    }

    pub fn contains(&self, key: K) -> bool {
        self.values.contains_key(&key)
    }

    /// Names of required attributes that were not present
    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}
