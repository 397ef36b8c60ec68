//! Application state for API handlers

use std::sync::Arc;
use std::time::Duration;

use vigil_health::Monitor;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Health monitor backing every endpoint
    pub monitor: Arc<Monitor>,

    /// Keep-alive interval for event streams
    pub keep_alive: Duration,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self {
            monitor,
            keep_alive: Duration::from_secs(15),
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}
