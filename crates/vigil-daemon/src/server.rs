//! Server setup and lifecycle management

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};
use vigil_health::{shutdown, Check, Monitor, Report, ShutdownHandle, State};

use crate::api::{create_router, AppState};
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::probes::http_check;

/// Vigil Daemon Server
pub struct Server {
    config: DaemonConfig,
    monitor: Arc<Monitor>,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("vigild/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DaemonError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let checks: Vec<Arc<dyn Check>> = config
            .checks
            .iter()
            .map(|check| Arc::new(http_check(check, client.clone())) as Arc<dyn Check>)
            .collect();

        Ok(Self::with_checks(config, checks))
    }

    /// Create a server around an explicit set of checks
    pub fn with_checks(config: DaemonConfig, checks: Vec<Arc<dyn Check>>) -> Self {
        let monitor = Arc::new(Monitor::with_config(checks, config.monitor.clone()));
        Self { config, monitor }
    }

    pub fn monitor(&self) -> Arc<Monitor> {
        Arc::clone(&self.monitor)
    }

    /// Run the server until Ctrl+C or SIGTERM
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        let state = AppState::new(self.monitor.clone())
            .with_keep_alive(self.config.server.keep_alive());
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;

        // Subscribe before starting so the first transitions are logged too
        let (reports, _unsubscribe) = self.monitor.subscribe();
        let logger = tokio::spawn(log_transitions(reports));

        let (handle, signal) = shutdown::channel();
        let handle = Arc::new(handle);
        let monitor_task = self.monitor.start(signal)?;

        info!(
            "Vigil daemon listening on {} with {} checks",
            addr,
            self.monitor.checks().len()
        );

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(Arc::clone(&handle)))
            .await
            .map_err(|e| DaemonError::Server(e.to_string()));

        info!("Vigil daemon shutting down");

        // Also covers serve failing before any signal arrived
        handle.shutdown();
        if let Err(err) = monitor_task.await {
            warn!(error = %err, "Health monitor task failed");
        }
        if let Err(err) = logger.await {
            warn!(error = %err, "Transition logger failed");
        }

        served
    }
}

/// Log every transition the monitor broadcasts until it closes the queue.
async fn log_transitions(mut reports: mpsc::Receiver<Report>) {
    while let Some(report) = reports.recv().await {
        let state = report.result.state;
        let error = report.result.error.as_ref().map(ToString::to_string);

        match report.metadata() {
            Some(metadata) => match state {
                State::Ok => info!(check = %metadata.name, %state, "Check state changed"),
                _ => warn!(
                    check = %metadata.name,
                    %state,
                    error = error.as_deref().unwrap_or(""),
                    "Check state changed"
                ),
            },
            None => info!(
                %state,
                current_hp = report.result.current_hp.unwrap_or_default(),
                "System state changed"
            ),
        }
    }
}

/// Wait for Ctrl+C or SIGTERM, then fire the monitor's shutdown
async fn shutdown_signal(handle: Arc<ShutdownHandle>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Closes subscriber queues, which ends open event streams
    handle.shutdown();
}
