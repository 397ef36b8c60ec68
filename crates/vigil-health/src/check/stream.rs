//! Push-streamed checks.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, instrument};

use super::{Check, Evaluation, Metadata, Report};
use crate::clock::{Clock, SystemClock};
use crate::shutdown::Shutdown;

/// Source of pushed evaluations.
///
/// `start` is called once per watch. It must return promptly and deliver
/// evaluations into `sink` from its own tasks. Dropping every clone of
/// `sink` ends the stream.
pub trait StreamSource: Send + Sync + 'static {
    fn start(&self, shutdown: Shutdown, sink: mpsc::Sender<Evaluation>);
}

impl<F> StreamSource for F
where
    F: Fn(Shutdown, mpsc::Sender<Evaluation>) + Send + Sync + 'static,
{
    fn start(&self, shutdown: Shutdown, sink: mpsc::Sender<Evaluation>) {
        self(shutdown, sink)
    }
}

/// Check that relays evaluations pushed by the caller, stamping each with
/// the current time.
#[derive(Clone)]
pub struct Stream {
    metadata: Metadata,
    clock: Arc<dyn Clock>,
    source: Arc<dyn StreamSource>,
}

impl Stream {
    /// Create a stream check around a source.
    pub fn new(metadata: Metadata, source: Arc<dyn StreamSource>) -> Self {
        Self {
            metadata,
            clock: Arc::new(SystemClock),
            source,
        }
    }

    /// Create a stream check from a push function.
    pub fn from_fn<F>(metadata: Metadata, push_fn: F) -> Self
    where
        F: Fn(Shutdown, mpsc::Sender<Evaluation>) + Send + Sync + 'static,
    {
        Self::new(metadata, Arc::new(push_fn))
    }

    /// Timestamp results with the given clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[instrument(skip_all, fields(check = %self.metadata.name))]
    async fn relay(
        self: Arc<Self>,
        shutdown: Shutdown,
        mut evaluations: mpsc::Receiver<Evaluation>,
        reports: mpsc::Sender<Report>,
    ) {
        let check: Arc<dyn Check> = self.clone();

        loop {
            let evaluation = tokio::select! {
                received = evaluations.recv() => match received {
                    Some(evaluation) => evaluation,
                    None => {
                        debug!("Stream source finished");
                        break;
                    }
                },
                _ = shutdown.cancelled() => break,
            };

            let report = Report::for_check(Arc::clone(&check), evaluation.at(self.clock.now()));
            tokio::select! {
                sent = reports.send(report) => {
                    if sent.is_err() {
                        break;
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }

        debug!("Stream watch stopped");
    }
}

impl Check for Stream {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn watch(self: Arc<Self>, shutdown: Shutdown, reports: mpsc::Sender<Report>) {
        let (sink, evaluations) = mpsc::channel(1);
        self.source.start(shutdown.clone(), sink);

        tokio::spawn(self.relay(shutdown, evaluations, reports));
    }
}
