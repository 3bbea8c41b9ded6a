//! Fiware multi-tenancy headers carried through every broker and
//! third-party call

/// Tenant header
pub const FIWARE_SERVICE: &str = "fiware-service";
/// Tenant sub-path header
pub const FIWARE_SERVICE_PATH: &str = "fiware-servicepath";
/// Log correlation header, echoed or generated per request
pub const CORRELATOR: &str = "unica-correlator";

/// Service scope of one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiwareHeaders {
    pub service: String,
    pub service_path: String,
    pub correlator: Option<String>,
}

impl FiwareHeaders {
    pub fn new(service: impl Into<String>, service_path: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            service_path: service_path.into(),
            correlator: None,
        }
    }

    pub fn with_correlator(mut self, correlator: impl Into<String>) -> Self {
        self.correlator = Some(correlator.into());
        self
    }
}
