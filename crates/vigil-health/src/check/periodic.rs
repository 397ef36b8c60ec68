//! Interval-polled checks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use super::{Check, CheckResult, Evaluation, Metadata, Report};
use crate::clock::{Clock, SystemClock};
use crate::error::ProbeError;
use crate::shutdown::Shutdown;
use crate::state::State;

/// A unary health probe.
///
/// Implement this trait to plug a dependency check into a [`Periodic`].
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    /// Evaluate the dependency once.
    ///
    /// `shutdown` fires when the owning monitor stops; honoring it is
    /// optional, an abandoned attempt is aborted by the caller.
    async fn run(&self, shutdown: Shutdown) -> Evaluation;
}

/// Check that runs a probe on a fixed interval.
///
/// The first attempt fires immediately. Each attempt is bounded by the
/// configured timeout; attempts that exceed it report `Unknown` with a
/// [`ProbeError::Timeout`].
#[derive(Clone)]
pub struct Periodic {
    metadata: Metadata,
    interval: Duration,
    timeout: Option<Duration>,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn Probe>,
}

impl Periodic {
    /// Create a periodic check with no timeout.
    pub fn new(metadata: Metadata, interval: Duration, probe: Arc<dyn Probe>) -> Self {
        Self {
            metadata,
            interval,
            timeout: None,
            clock: Arc::new(SystemClock),
            probe,
        }
    }

    /// Create a periodic check from an async closure.
    pub fn from_fn<F, Fut>(metadata: Metadata, interval: Duration, probe_fn: F) -> Self
    where
        F: Fn(Shutdown) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Evaluation> + Send + 'static,
    {
        Self::new(metadata, interval, Arc::new(ClosureProbe { probe_fn }))
    }

    /// Bound every attempt. A zero duration means no bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Timestamp results with the given clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Interval between attempts.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Per-attempt bound, `None` when unbounded.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Evaluate the probe once.
    ///
    /// The probe runs on its own task. If the timeout elapses first, or
    /// this future is dropped, the task is aborted and its eventual
    /// outcome discarded.
    pub async fn once(&self, shutdown: Shutdown) -> CheckResult {
        let probe = Arc::clone(&self.probe);
        let mut attempt = Attempt(tokio::spawn(async move { probe.run(shutdown).await }));

        let joined = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, &mut attempt.0).await {
                Ok(joined) => joined,
                Err(_) => {
                    debug!(
                        check = %self.metadata.name,
                        timeout_ms = timeout.as_millis() as u64,
                        "Probe timed out"
                    );
                    return Evaluation::with_error(State::Unknown, ProbeError::Timeout(timeout))
                        .at(self.clock.now());
                }
            },
            None => (&mut attempt.0).await,
        };

        match joined {
            Ok(evaluation) => evaluation.at(self.clock.now()),
            Err(e) => {
                warn!(check = %self.metadata.name, error = %e, "Probe task failed");
                Evaluation::with_error(State::Unknown, ProbeError::Aborted(e.to_string()))
                    .at(self.clock.now())
            }
        }
    }

    #[instrument(skip_all, fields(check = %self.metadata.name))]
    async fn run_loop(self: Arc<Self>, shutdown: Shutdown, reports: mpsc::Sender<Report>) {
        let check: Arc<dyn Check> = self.clone();

        loop {
            let result = tokio::select! {
                result = self.once(shutdown.clone()) => result,
                _ = shutdown.cancelled() => break,
            };

            debug!(state = %result.state, "Periodic evaluation complete");

            let report = Report::for_check(Arc::clone(&check), result);
            tokio::select! {
                sent = reports.send(report) => {
                    if sent.is_err() {
                        debug!("Report queue closed, stopping");
                        break;
                    }
                }
                _ = shutdown.cancelled() => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        debug!("Periodic watch stopped");
    }
}

impl Check for Periodic {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn watch(self: Arc<Self>, shutdown: Shutdown, reports: mpsc::Sender<Report>) {
        tokio::spawn(self.run_loop(shutdown, reports));
    }
}

/// Aborts the probe task when dropped.
struct Attempt(JoinHandle<Evaluation>);

impl Drop for Attempt {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Probe implementation using a closure.
struct ClosureProbe<F> {
    probe_fn: F,
}

#[async_trait]
impl<F, Fut> Probe for ClosureProbe<F>
where
    F: Fn(Shutdown) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Evaluation> + Send + 'static,
{
    async fn run(&self, shutdown: Shutdown) -> Evaluation {
        (self.probe_fn)(shutdown).await
    }
}
