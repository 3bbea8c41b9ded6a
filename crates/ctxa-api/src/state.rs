//! Application state for the adapter API

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ctxa_core::{AdapterMode, EntityAttributeScheme, FiwareHeaders, RequestValidator};
use ctxa_orchestrator::OperationOrchestrator;

/// Number of inbound requests attended since the last reset
#[derive(Debug, Default)]
pub struct RequestCounter(AtomicU64);

impl RequestCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Read and reset in one step
    pub fn take(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// Route layout and header fallbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Prefix of every NGSI route, e.g. `/v1`
    pub base_path: String,
    /// Callback route relative to `base_path`, e.g. `/callback`
    pub callback_path: String,
    /// Service headers used when a third party does not send them back
    pub default_headers: FiwareHeaders,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_path: "/v1".to_string(),
            callback_path: "/callback".to_string(),
            default_headers: FiwareHeaders::new("blackbutton", "/"),
        }
    }
}

impl ApiConfig {
    /// Full path of an NGSI operation route
    pub fn route(&self, operation: &str) -> String {
        format!("{}/{}", self.base_path.trim_end_matches('/'), operation)
    }

    /// Full path of the third-party callback route
    pub fn callback_route(&self) -> String {
        let path = self.callback_path.trim_start_matches('/');
        format!("{}/{}", self.base_path.trim_end_matches('/'), path)
    }

    /// Routes that require Fiware service headers
    pub fn ngsi_routes(&self) -> [String; 3] {
        [
            self.route("updateContext"),
            self.route("notify"),
            self.route("queryContext"),
        ]
    }
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<OperationOrchestrator>,
    validator: Arc<RequestValidator>,
    counter: Arc<RequestCounter>,
    config: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(orchestrator: Arc<OperationOrchestrator>, config: ApiConfig) -> Self {
        Self::with_counter(orchestrator, config, Arc::new(RequestCounter::new()))
    }

    /// Create state sharing an existing counter (the daemon's heartbeat reads it)
    pub fn with_counter(
        orchestrator: Arc<OperationOrchestrator>,
        config: ApiConfig,
        counter: Arc<RequestCounter>,
    ) -> Self {
        let scheme = Arc::new(orchestrator.scheme().clone());
        Self {
            validator: Arc::new(RequestValidator::new(scheme)),
            orchestrator,
            counter,
            config: Arc::new(config),
        }
    }

    pub fn orchestrator(&self) -> &Arc<OperationOrchestrator> {
        &self.orchestrator
    }

    pub fn validator(&self) -> &RequestValidator {
        &self.validator
    }

    pub fn scheme(&self) -> &EntityAttributeScheme {
        self.orchestrator.scheme()
    }

    pub fn mode(&self) -> AdapterMode {
        self.scheme().mode()
    }

    pub fn counter(&self) -> &Arc<RequestCounter> {
        &self.counter
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }
}
