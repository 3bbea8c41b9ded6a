//! Service descriptor resolved from the broker

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::operation::InteractionType;

/// Optional request mapping of a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// Suffix appended to the service endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// How to reach and call a third-party service.
///
/// Built once per operation from the broker's service entity and never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    pub id: String,
    pub provider: Option<String>,
    pub interaction_type: InteractionType,
    pub endpoint: String,
    pub method: String,
    /// Opaque; carried but not interpreted by the adapter
    pub authentication: Option<Value>,
    pub mapping: Mapping,
    /// Dispatch timeout in milliseconds
    pub timeout_ms: u64,
}

impl ServiceDescriptor {
    /// Full dispatch URL: endpoint followed by the mapping path, if any
    pub fn target_url(&self) -> String {
        match self.mapping.path.as_deref() {
            Some(path) if !path.is_empty() => format!("{}{}", self.endpoint, path),
            _ => self.endpoint.clone(),
        }
    }
}
