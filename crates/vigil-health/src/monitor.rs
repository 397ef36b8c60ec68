//! Health monitor: owns the checks and the aggregation loop.
//!
//! The monitor watches every registered check against a shared report
//! queue and folds reports into the summary from a single consumer task,
//! so no two updates ever race.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::check::{Check, Report};
use crate::clock::{Clock, SystemClock};
use crate::config::MonitorConfig;
use crate::error::{HealthError, HealthResult};
use crate::report::HealthReport;
use crate::shutdown::Shutdown;
use crate::summary::Summary;

/// Consolidates reports from every check and broadcasts transitions to
/// subscribers.
pub struct Monitor {
    checks: Vec<Arc<dyn Check>>,
    config: MonitorConfig,
    started: Mutex<bool>,
    summary: Arc<Mutex<Summary>>,
}

impl Monitor {
    /// Create a monitor observing `checks` with default configuration.
    pub fn new(checks: Vec<Arc<dyn Check>>) -> Self {
        Self::with_config(checks, MonitorConfig::default())
    }

    /// Create a monitor observing `checks`.
    ///
    /// Check names must be unique; the total weight is fixed here.
    pub fn with_config(checks: Vec<Arc<dyn Check>>, config: MonitorConfig) -> Self {
        {
            let mut names = HashSet::new();
            for check in &checks {
                let name = &check.metadata().name;
                if !names.insert(name.as_str()) {
                    warn!(check = %name, "Duplicate check name registered");
                }
            }
        }

        let summary = Summary::new(
            &checks,
            config.subscriber_capacity_for(checks.len()),
            Arc::new(SystemClock),
        );

        Self {
            checks,
            config,
            started: Mutex::new(false),
            summary: Arc::new(Mutex::new(summary)),
        }
    }

    /// Replace the clock used to timestamp system results.
    pub fn set_clock(&self, clock: Arc<dyn Clock>) -> HealthResult<()> {
        let started = self.started.lock();
        if *started {
            return Err(HealthError::AlreadyStarted);
        }

        self.summary.lock().set_clock(clock);
        Ok(())
    }

    /// Start watching every check and consuming their reports.
    ///
    /// Must be called from within a tokio runtime. The returned handle
    /// completes once the aggregation loop has stopped, which only happens
    /// when `shutdown` fires.
    #[instrument(skip_all, fields(checks = self.checks.len()))]
    pub fn start(&self, shutdown: Shutdown) -> HealthResult<JoinHandle<()>> {
        let mut started = self.started.lock();
        if *started {
            warn!("Monitor start requested twice");
            return Err(HealthError::AlreadyStarted);
        }
        *started = true;

        let capacity = self.config.report_queue_capacity_for(self.checks.len());
        let (tx, rx) = mpsc::channel(capacity);

        for check in &self.checks {
            debug!(check = %check.metadata().name, "Watching check");
            Arc::clone(check).watch(shutdown.clone(), tx.clone());
        }
        drop(tx);

        info!("Health monitor started");

        Ok(tokio::spawn(consume(
            Arc::clone(&self.summary),
            shutdown,
            rx,
        )))
    }

    /// Whether `start` has been called.
    pub fn is_started(&self) -> bool {
        *self.started.lock()
    }

    /// Register a new subscriber.
    ///
    /// The subscriber receives every check and system transition broadcast
    /// after this call. Reports that do not fit in its queue are dropped
    /// for that subscriber only.
    pub fn subscribe(&self) -> (mpsc::Receiver<Report>, Unsubscribe) {
        let (id, rx) = self.summary.lock().subscribe();

        let handle = Unsubscribe {
            id,
            summary: Arc::downgrade(&self.summary),
        };
        (rx, handle)
    }

    /// Snapshot of the system and every registered check.
    pub fn report(&self) -> HealthReport {
        self.summary.lock().report()
    }

    /// Registered checks, in registration order.
    pub fn checks(&self) -> &[Arc<dyn Check>] {
        &self.checks
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.summary.lock().subscriber_count()
    }

    /// Reports lost to full subscriber queues since construction.
    pub fn dropped_reports(&self) -> u64 {
        self.summary.lock().dropped_reports()
    }
}

/// Single consumer of the report queue.
async fn consume(
    summary: Arc<Mutex<Summary>>,
    shutdown: Shutdown,
    mut reports: mpsc::Receiver<Report>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            received = reports.recv() => match received {
                Some(report) => summary.lock().update(report),
                None => {
                    debug!("All checks stopped reporting");
                    shutdown.cancelled().await;
                    break;
                }
            },
        }
    }

    summary.lock().close_subscribers();
    info!("Health monitor stopped");
}

/// Disposal capability returned by [`Monitor::subscribe`].
///
/// Dropping it without calling [`unsubscribe`](Self::unsubscribe) keeps
/// the subscription alive until its receiver is dropped.
#[derive(Debug)]
pub struct Unsubscribe {
    id: Uuid,
    summary: Weak<Mutex<Summary>>,
}

impl Unsubscribe {
    /// Identifier of the subscription.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Remove the subscription and close its queue.
    ///
    /// Reports already queued can still be read; the receiver then observes
    /// end-of-stream.
    pub fn unsubscribe(self) {
        if let Some(summary) = self.summary.upgrade() {
            summary.lock().unsubscribe(&self.id);
        }
    }
}
