//! Error types for vigil-health crate.
//!
//! `HealthError` covers caller mistakes against the monitor API.
//! `ProbeError` is never returned to callers; it is carried inside a
//! [`CheckResult`](crate::CheckResult) when an evaluation could not finish.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by the health monitoring API.
#[derive(Debug, Error)]
pub enum HealthError {
    /// The monitor was already started.
    #[error("monitor already started")]
    AlreadyStarted,

    /// A state token could not be parsed.
    #[error("invalid health state: {0}")]
    InvalidState(String),
}

/// Result type for health operations.
pub type HealthResult<T> = Result<T, HealthError>;

/// Reasons an evaluation produced no verdict of its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// The probe did not complete within its timeout.
    #[error("timed out waiting for check after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The probe task panicked or was cancelled before producing a result.
    #[error("probe task aborted: {0}")]
    Aborted(String),
}
