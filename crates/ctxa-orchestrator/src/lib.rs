//! ctxa-orchestrator - Operation orchestration for the context adapter
//!
//! Turns a validated [`OperationDescriptor`](ctxa_core::OperationDescriptor)
//! into exactly one broker status notification:
//!
//! ```text
//! VALIDATING ──error──► 400 acknowledgement, no status write
//!        │
//!        ▼
//! RESOLVING_SERVICE ──error──────────────────────────────► CLOSED
//!        │
//!        ▼
//!   DISPATCHING ──S ok──► COMPLETED
//!        │      ──C ok──► IN_PROGRESS ──callback──► COMPLETED
//!        └──────error───► CLOSED
//! ```
//!
//! The orchestrator only talks to the network through the
//! [`ContextBroker`](ctxa_core::ContextBroker) and
//! [`ThirdPartyTransport`](ctxa_core::ThirdPartyTransport) traits.

pub mod locks;
pub mod notifier;
pub mod orchestrator;
pub mod resolver;

#[cfg(test)]
mod test_support;

pub use locks::{ButtonGuard, ButtonLocks};
pub use notifier::Notifier;
pub use orchestrator::{CallbackError, CallbackPayload, OperationOrchestrator, OperationState};
pub use resolver::ServiceResolver;
