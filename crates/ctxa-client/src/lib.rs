//! ctxa-client - HTTP clients for the context adapter
//!
//! Implements the [`ContextBroker`](ctxa_core::ContextBroker) and
//! [`ThirdPartyTransport`](ctxa_core::ThirdPartyTransport) traits over
//! `reqwest`.
//!
//! # Example
//!
//! ```rust,no_run
//! use ctxa_client::BrokerClient;
//! use ctxa_core::{ContextBroker, FiwareHeaders, QueryContextRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let broker = BrokerClient::new("http://localhost:1026/v1")?;
//!     let headers = FiwareHeaders::new("blackbutton", "/");
//!
//!     let query = QueryContextRequest::single("svc1", "service", ["endpoint"]);
//!     let body = broker.query_context(&headers, &query).await?;
//!     println!("{} responses", body.context_responses.len());
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module runs axum routers on ephemeral ports and provides
//! a recording [`MockBroker`](testing::MockBroker):
//!
//! ```rust,ignore
//! use ctxa_client::testing::{MockBroker, TestServer};
//!
//! let broker = MockBroker::new();
//! let server = TestServer::start(broker.router()).await?;
//! ```

mod broker;
mod dispatch;
pub mod testing;

pub use broker::BrokerClient;
pub use dispatch::{build_payload, HttpDispatcher};
