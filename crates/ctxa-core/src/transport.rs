//! Transport traits - the seams between orchestration and the network
//!
//! `ctxa-client` implements both traits over HTTP; tests substitute
//! in-memory recorders.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AdapterResult;
use crate::models::{
    ContextResponseBody, FiwareHeaders, OperationDescriptor, QueryContextRequest,
    ServiceDescriptor, UpdateContextRequest,
};

/// Read/write access to the context broker.
///
/// Implementations normalize every failure (connection, non-2xx status,
/// `errorCode` envelope) into [`AdapterError::Broker`](crate::AdapterError::Broker)
/// and never retry.
#[async_trait]
pub trait ContextBroker: Send + Sync {
    async fn query_context(
        &self,
        headers: &FiwareHeaders,
        query: &QueryContextRequest,
    ) -> AdapterResult<ContextResponseBody>;

    async fn update_context(
        &self,
        headers: &FiwareHeaders,
        request: &UpdateContextRequest,
    ) -> AdapterResult<ContextResponseBody>;
}

/// Raw reply of a third-party service
#[derive(Debug, Clone, PartialEq)]
pub struct ThirdPartyResponse {
    pub status: u16,
    /// JSON body, or `Value::Null` when the body was empty or not JSON
    pub body: Value,
}

impl ThirdPartyResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound call to a third-party service.
///
/// Returns the raw response; deciding what a status means is left to the
/// orchestrator. Transport failures map to
/// [`AdapterError::ThirdParty`](crate::AdapterError::ThirdParty).
#[async_trait]
pub trait ThirdPartyTransport: Send + Sync {
    async fn dispatch(
        &self,
        service: &ServiceDescriptor,
        operation: &OperationDescriptor,
        callback_url: &str,
        headers: &FiwareHeaders,
    ) -> AdapterResult<ThirdPartyResponse>;
}
