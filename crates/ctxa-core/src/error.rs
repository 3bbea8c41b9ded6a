//! Error taxonomy shared by the adapter crates

use thiserror::Error;

/// Result type for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Every failure the adapter can report, either synchronously in the NGSI
/// acknowledgement or asynchronously through a `closed` status update.
///
/// Each variant exposes a stable [`code`](AdapterError::code) and a
/// human-readable [`message`](AdapterError::message).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// Inbound update/notification does not have the expected shape
    #[error("BAD_PAYLOAD - {0}")]
    BadPayload(String),

    /// Service descriptor returned by the broker is malformed or incomplete
    #[error("BAD_SERVICE - service {service_id}: {reason}")]
    BadService { service_id: String, reason: String },

    /// Interaction type missing or not one of the known values
    #[error("BAD_INTERACTION_TYPE - {0}")]
    BadInteractionType(String),

    /// Notification arrived with a status other than `pending`
    #[error("BAD_OPERATION_STATUS - button {button_id} has status '{status}'")]
    BadOperationStatus { button_id: String, status: String },

    /// Transport failure or error envelope from the context broker
    #[error("BROKER_ERROR - {code}: {message}")]
    Broker { code: String, message: String },

    /// Transport failure or non-2xx reply from the third-party service
    #[error("THIRD_PARTY_ERROR - {code}: {message}")]
    ThirdParty { code: String, message: String },
}

impl AdapterError {
    /// Create a broker error from an upstream code and message
    pub fn broker(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Broker {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a third-party error from an upstream code and message
    pub fn third_party(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ThirdParty {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a bad-service error for the given service id
    pub fn bad_service(service_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadService {
            service_id: service_id.into(),
            reason: reason.into(),
        }
    }

    /// Stable taxonomy code
    pub fn code(&self) -> &'static str {
        match self {
            AdapterError::BadPayload(_) => "BAD_PAYLOAD",
            AdapterError::BadService { .. } => "BAD_SERVICE",
            AdapterError::BadInteractionType(_) => "BAD_INTERACTION_TYPE",
            AdapterError::BadOperationStatus { .. } => "BAD_OPERATION_STATUS",
            AdapterError::Broker { .. } => "BROKER_ERROR",
            AdapterError::ThirdParty { .. } => "THIRD_PARTY_ERROR",
        }
    }

    /// Human-readable message, without the taxonomy code
    pub fn message(&self) -> String {
        match self {
            AdapterError::BadPayload(msg) | AdapterError::BadInteractionType(msg) => msg.clone(),
            AdapterError::BadService { service_id, reason } => {
                format!("service {}: {}", service_id, reason)
            }
            AdapterError::BadOperationStatus { button_id, status } => {
                format!("button {} has status '{}'", button_id, status)
            }
            AdapterError::Broker { code, message } | AdapterError::ThirdParty { code, message } => {
                format!("{}: {}", code, message)
            }
        }
    }

    /// `reasonPhrase` used in NGSI status codes: `"<code> - <message>"`
    pub fn reason_phrase(&self) -> String {
        format!("{} - {}", self.code(), self.message())
    }

    /// Legacy `op_result` encoding for a failed operation: `"0,<code>,<message>"`
    pub fn encode_result(&self) -> String {
        format!("0,{},{}", self.code(), self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_phrase_starts_with_code() {
        let err = AdapterError::BadPayload("missing id".to_string());
        assert_eq!(err.reason_phrase(), "BAD_PAYLOAD - missing id");
        assert_eq!(err.to_string(), err.reason_phrase());
    }

    #[test]
    fn encode_result_uses_legacy_format() {
        let err = AdapterError::broker("404", "No context element found");
        assert_eq!(
            err.encode_result(),
            "0,BROKER_ERROR,404: No context element found"
        );
    }

    #[test]
    fn bad_operation_status_names_button() {
        let err = AdapterError::BadOperationStatus {
            button_id: "btn1".to_string(),
            status: "completed".to_string(),
        };
        assert_eq!(err.code(), "BAD_OPERATION_STATUS");
        assert!(err.message().contains("btn1"));
        assert!(err.message().contains("completed"));
    }
}
