//! Entity attribute scheme
//!
//! The adapter runs either as a context provider (the broker forwards
//! updateContext requests for `aux_`-prefixed attributes) or as a
//! notification receiver (the broker notifies unprefixed attributes through a
//! subscription). The naming difference is resolved once at startup into an
//! [`EntityAttributeScheme`] that every component consults.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::attributes::AttributeSpec;

/// Operating mode of the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterMode {
    ContextProvider,
    Notification,
}

impl AdapterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterMode::ContextProvider => "context_provider",
            AdapterMode::Notification => "notification",
        }
    }
}

impl FromStr for AdapterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "context_provider" | "contextprovider" => Ok(AdapterMode::ContextProvider),
            "notification" => Ok(AdapterMode::Notification),
            other => Err(format!(
                "unknown mode '{}', expected 'context_provider' or 'notification'",
                other
            )),
        }
    }
}

impl fmt::Display for AdapterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes of a button entity the adapter reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonAttribute {
    InteractionType,
    ServiceId,
    OpAction,
    OpExtra,
    OpStatus,
    OpResult,
    ExternalId,
}

impl ButtonAttribute {
    /// Unprefixed attribute name
    pub const fn base_name(self) -> &'static str {
        match self {
            ButtonAttribute::InteractionType => "interaction_type",
            ButtonAttribute::ServiceId => "service_id",
            ButtonAttribute::OpAction => "op_action",
            ButtonAttribute::OpExtra => "op_extra",
            ButtonAttribute::OpStatus => "op_status",
            ButtonAttribute::OpResult => "op_result",
            ButtonAttribute::ExternalId => "external_id",
        }
    }
}

/// Attributes of a service entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceAttribute {
    Provider,
    InteractionType,
    Endpoint,
    Method,
    Authentication,
    Mapping,
    Timeout,
}

impl ServiceAttribute {
    pub const ALL: [ServiceAttribute; 7] = [
        ServiceAttribute::Provider,
        ServiceAttribute::InteractionType,
        ServiceAttribute::Endpoint,
        ServiceAttribute::Method,
        ServiceAttribute::Authentication,
        ServiceAttribute::Mapping,
        ServiceAttribute::Timeout,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            ServiceAttribute::Provider => "provider",
            ServiceAttribute::InteractionType => "interaction_type",
            ServiceAttribute::Endpoint => "endpoint",
            ServiceAttribute::Method => "method",
            ServiceAttribute::Authentication => "authentication",
            ServiceAttribute::Mapping => "mapping",
            ServiceAttribute::Timeout => "timeout",
        }
    }

    /// Provider and authentication may be absent
    pub const fn required(self) -> bool {
        !matches!(
            self,
            ServiceAttribute::Provider | ServiceAttribute::Authentication
        )
    }
}

/// Attribute naming and entity types for the configured mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityAttributeScheme {
    mode: AdapterMode,
    button_type: String,
    service_type: String,
}

impl EntityAttributeScheme {
    pub fn new(
        mode: AdapterMode,
        button_type: impl Into<String>,
        service_type: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            button_type: button_type.into(),
            service_type: service_type.into(),
        }
    }

    pub fn mode(&self) -> AdapterMode {
        self.mode
    }

    pub fn button_type(&self) -> &str {
        &self.button_type
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Name of a button attribute as it appears in inbound requests
    pub fn request_name(&self, attribute: ButtonAttribute) -> String {
        match self.mode {
            AdapterMode::ContextProvider => format!("aux_{}", attribute.base_name()),
            AdapterMode::Notification => attribute.base_name().to_string(),
        }
    }

    /// Name of a button attribute written back to the broker.
    ///
    /// Always unprefixed: `aux_` attributes are served by this adapter, so
    /// writing them would loop back into it.
    pub fn state_name(&self, attribute: ButtonAttribute) -> &'static str {
        attribute.base_name()
    }

    /// Declared attributes of an inbound button request.
    ///
    /// Interaction type is declared optional here; its conditional
    /// requirement depends on the action and is enforced by the validator.
    pub fn request_attributes(&self) -> Vec<AttributeSpec<ButtonAttribute>> {
        let mut specs = vec![
            AttributeSpec::optional(
                ButtonAttribute::InteractionType,
                self.request_name(ButtonAttribute::InteractionType),
            ),
            AttributeSpec::required(
                ButtonAttribute::ServiceId,
                self.request_name(ButtonAttribute::ServiceId),
            ),
            AttributeSpec::required(
                ButtonAttribute::OpAction,
                self.request_name(ButtonAttribute::OpAction),
            ),
            AttributeSpec::required(
                ButtonAttribute::OpExtra,
                self.request_name(ButtonAttribute::OpExtra),
            ),
        ];
        let status_name = self.request_name(ButtonAttribute::OpStatus);
        specs.push(match self.mode {
            AdapterMode::Notification => {
                AttributeSpec::required(ButtonAttribute::OpStatus, status_name)
            }
            AdapterMode::ContextProvider => {
                AttributeSpec::optional(ButtonAttribute::OpStatus, status_name)
            }
        });
        specs
    }

    /// Declared attributes of a service entity
    pub fn service_attributes(&self) -> Vec<AttributeSpec<ServiceAttribute>> {
        ServiceAttribute::ALL
            .into_iter()
            .map(|attr| AttributeSpec {
                key: attr,
                name: attr.name().to_string(),
                required: attr.required(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_provider_prefixes_request_names() {
        let scheme = EntityAttributeScheme::new(AdapterMode::ContextProvider, "button", "service");
        assert_eq!(scheme.request_name(ButtonAttribute::ServiceId), "aux_service_id");
        assert_eq!(scheme.state_name(ButtonAttribute::OpStatus), "op_status");
    }

    #[test]
    fn notification_requires_status() {
        let scheme = EntityAttributeScheme::new(AdapterMode::Notification, "button", "service");
        let status = scheme
            .request_attributes()
            .into_iter()
            .find(|spec| spec.key == ButtonAttribute::OpStatus)
            .unwrap();
        assert!(status.required);
        assert_eq!(status.name, "op_status");
    }

    #[test]
    fn mode_parses_loosely() {
        assert_eq!(
            "Context-Provider".parse::<AdapterMode>().unwrap(),
            AdapterMode::ContextProvider
        );
        assert!("broker".parse::<AdapterMode>().is_err());
    }
}
