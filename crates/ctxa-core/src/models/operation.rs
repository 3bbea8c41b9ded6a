//! Operation models: what a button asked for and how it ended

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AdapterError;

/// How the third party answers: in the same HTTP exchange or later via callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    Synchronous,
    Asynchronous,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Synchronous => "synchronous",
            InteractionType::Asynchronous => "asynchronous",
        }
    }
}

impl FromStr for InteractionType {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("synchronous") {
            Ok(InteractionType::Synchronous)
        } else if s.eq_ignore_ascii_case("asynchronous") {
            Ok(InteractionType::Asynchronous)
        } else {
            Err(AdapterError::BadInteractionType(format!(
                "unknown interaction type '{}'",
                s
            )))
        }
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested operation action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationAction {
    /// `S`: call the third party and wait for its answer
    #[serde(rename = "S")]
    Synchronous,
    /// `C`: create a job at the third party and wait for its callback
    #[serde(rename = "C")]
    Create,
}

impl OperationAction {
    pub const ALLOWED: [&'static str; 2] = ["S", "C"];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationAction::Synchronous => "S",
            OperationAction::Create => "C",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "S" => Some(OperationAction::Synchronous),
            "C" => Some(OperationAction::Create),
            _ => None,
        }
    }
}

impl fmt::Display for OperationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation status as stored on the button entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Completed,
    Closed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::InProgress => "in_progress",
            OperationStatus::Completed => "completed",
            OperationStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            OperationStatus::Pending,
            OperationStatus::InProgress,
            OperationStatus::Completed,
            OperationStatus::Closed,
        ]
        .into_iter()
        .find(|status| status.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed representation of a button press, built once per inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub button_id: String,
    /// `None` when the request relied on the synchronous-only exception;
    /// the service descriptor then decides.
    pub interaction_type: Option<InteractionType>,
    pub service_id: String,
    pub action: OperationAction,
    pub extra: String,
}

/// Result of the third-party exchange
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    Success { details: Map<String, Value> },
    Failure(AdapterError),
}

impl OperationOutcome {
    /// Broker-facing status for this outcome
    pub fn status(&self) -> OperationStatus {
        match self {
            OperationOutcome::Success { .. } => OperationStatus::Completed,
            OperationOutcome::Failure(_) => OperationStatus::Closed,
        }
    }

    /// `op_result` value for this outcome
    pub fn encode_result(&self) -> String {
        match self {
            OperationOutcome::Success { details } => encode_details(details),
            OperationOutcome::Failure(err) => err.encode_result(),
        }
    }
}

/// Encode success details as `"<key>-<value>;"` pairs in response order.
///
/// A success without details is encoded as `"1"`.
pub fn encode_details(details: &Map<String, Value>) -> String {
    if details.is_empty() {
        return "1".to_string();
    }

    details
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}-{};", key, s),
            other => format!("{}-{};", key, other),
        })
        .collect()
}
