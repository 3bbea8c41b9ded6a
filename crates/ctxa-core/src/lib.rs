//! ctxa-core - Core types for the context adapter
//!
//! This crate holds everything the adapter needs that does not touch the
//! network: NGSI wire models, the attribute codec, the entity attribute
//! scheme resolved from the operating mode, inbound request validation,
//! acknowledgement composition, the error taxonomy shared by every other
//! crate, and the transport traits the orchestrator is written against.

pub mod attributes;
pub mod error;
pub mod models;
pub mod response;
pub mod scheme;
pub mod transport;
pub mod validate;

pub use attributes::{AttributeMap, AttributeSpec, EntityKind};
pub use error::{AdapterError, AdapterResult};
pub use models::*;
pub use response::{compose_query_response, compose_update_response, NgsiAck};
pub use scheme::{AdapterMode, ButtonAttribute, EntityAttributeScheme, ServiceAttribute};
pub use transport::{ContextBroker, ThirdPartyResponse, ThirdPartyTransport};
pub use validate::RequestValidator;
