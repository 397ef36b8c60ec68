//! Vigil Daemon library
//!
//! Serves a weighted health monitor over HTTP:
//! - `GET /healthz` renders the current report (500 during an outage)
//! - `GET /healthz/events` streams check and system transitions via SSE
//! - HTTP probes configured per check
//! - Server lifecycle with graceful shutdown

pub mod api;
pub mod config;
pub mod error;
pub mod probes;
pub mod server;

pub use api::{create_router, AppState};
pub use config::{DaemonConfig, HttpCheckConfig};
pub use error::{DaemonError, DaemonResult};
pub use probes::{http_check, HttpProbe};
pub use server::Server;
