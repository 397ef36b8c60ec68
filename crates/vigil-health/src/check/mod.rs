//! Checks: the smallest unit of health.
//!
//! A [`Check`] pairs identity ([`Metadata`]) with a way of producing
//! [`Report`]s over time. Two evaluation strategies ship with the crate:
//!
//! - [`Periodic`]: runs a probe on a fixed interval, bounded by a timeout
//! - [`Stream`]: relays results pushed by the caller

mod periodic;
mod stream;

pub use periodic::{Periodic, Probe};
pub use stream::{Stream, StreamSource};

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::mpsc;

use crate::error::ProbeError;
use crate::shutdown::Shutdown;
use crate::state::State;

/// A named, weighted unit of health evaluation.
pub trait Check: Send + Sync + 'static {
    /// Identity of the check.
    fn metadata(&self) -> &Metadata;

    /// Arrange for reports to be delivered into `reports` until `shutdown`
    /// fires.
    ///
    /// Must return promptly: all evaluation happens on spawned tasks. The
    /// monitor watches every check in registration order before it starts
    /// consuming reports.
    fn watch(self: Arc<Self>, shutdown: Shutdown, reports: mpsc::Sender<Report>);
}

/// Information common to every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Unique name within a monitor.
    pub name: String,

    /// Where to look when this check fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runbook: Option<String>,

    /// Share of the system health this check accounts for.
    pub weight: u32,
}

impl Metadata {
    /// Create metadata with the given name and weight.
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            runbook: None,
            weight,
        }
    }

    /// Attach a runbook reference.
    pub fn with_runbook(mut self, runbook: impl Into<String>) -> Self {
        self.runbook = Some(runbook.into());
        self
    }

    /// Override the weight.
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

/// Opaque error attached to a result.
///
/// Serializes as its message string. Cloning shares the underlying error.
#[derive(Clone)]
pub struct CheckError(Arc<dyn StdError + Send + Sync + 'static>);

impl CheckError {
    /// Wrap an arbitrary error.
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(err))
    }

    /// Error carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(Arc::new(Message(message.into())))
    }

    /// Access the wrapped error as a concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// The timeout or abort reason, if the evaluation never finished.
    pub fn probe_error(&self) -> Option<&ProbeError> {
        self.downcast_ref::<ProbeError>()
    }
}

impl fmt::Debug for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl StdError for CheckError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl From<ProbeError> for CheckError {
    fn from(err: ProbeError) -> Self {
        CheckError::new(err)
    }
}

impl From<Box<dyn StdError + Send + Sync + 'static>> for CheckError {
    fn from(err: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Self(Arc::from(err))
    }
}

impl From<String> for CheckError {
    fn from(message: String) -> Self {
        CheckError::msg(message)
    }
}

impl From<&str> for CheckError {
    fn from(message: &str) -> Self {
        CheckError::msg(message)
    }
}

impl Serialize for CheckError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CheckError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(CheckError::msg)
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

/// What a probe concluded: a state, optionally explained by an error.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub state: State,
    pub error: Option<CheckError>,
}

impl Evaluation {
    /// Verdict without an error.
    pub fn new(state: State) -> Self {
        Self { state, error: None }
    }

    /// Verdict explained by an error.
    pub fn with_error(state: State, error: impl Into<CheckError>) -> Self {
        Self {
            state,
            error: Some(error.into()),
        }
    }

    /// Stamp the evaluation, turning it into a result.
    pub fn at(self, timestamp: DateTime<Utc>) -> CheckResult {
        CheckResult {
            state: self.state,
            current_hp: None,
            error: self.error,
            timestamp,
        }
    }
}

impl From<State> for Evaluation {
    fn from(state: State) -> Self {
        Evaluation::new(state)
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub state: State,

    /// Normalized system health; only set on system results.
    #[serde(
        rename = "currentHP",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub current_hp: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CheckError>,

    pub timestamp: DateTime<Utc>,
}

impl CheckResult {
    /// Placeholder for a check that has never been evaluated.
    pub fn unknown() -> Self {
        Self {
            state: State::Unknown,
            current_hp: None,
            error: None,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl Default for CheckResult {
    fn default() -> Self {
        Self::unknown()
    }
}

/// A result paired with the check that produced it.
///
/// A report without a check is a system-level event: the aggregate state
/// changed.
#[derive(Clone)]
pub struct Report {
    pub check: Option<Arc<dyn Check>>,
    pub result: CheckResult,
}

impl Report {
    /// Report produced by a check.
    pub fn for_check(check: Arc<dyn Check>, result: CheckResult) -> Self {
        Self {
            check: Some(check),
            result,
        }
    }

    /// Report announcing a new system state.
    pub fn system(result: CheckResult) -> Self {
        Self {
            check: None,
            result,
        }
    }

    /// Whether this is a system-level event.
    pub fn is_system(&self) -> bool {
        self.check.is_none()
    }

    /// Metadata of the originating check, if any.
    pub fn metadata(&self) -> Option<&Metadata> {
        self.check.as_deref().map(|check| check.metadata())
    }
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("check", &self.metadata().map(|m| m.name.as_str()))
            .field("result", &self.result)
            .finish()
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            check: Option<&'a Metadata>,
            result: &'a CheckResult,
        }

        Wire {
            check: self.metadata(),
            result: &self.result,
        }
        .serialize(serializer)
    }
}
