//! Shared state injected into the intake, the modes and the health endpoint

use std::sync::Arc;

use crate::error::FailureReporter;
use crate::session::{ConnectionRegistry, SessionHooks};
use crate::transport::QueueTransport;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub transport: Arc<dyn QueueTransport>,
    pub registry: Arc<ConnectionRegistry>,
    pub hooks: Arc<dyn SessionHooks>,
    pub failures: FailureReporter,
}

impl AppState {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        hooks: Arc<dyn SessionHooks>,
        failures: FailureReporter,
    ) -> Self {
        Self {
            transport,
            registry: Arc::new(ConnectionRegistry::new()),
            hooks,
            failures,
        }
    }
}
