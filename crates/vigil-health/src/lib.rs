//! # Vigil Health - Weighted Health Aggregation
//!
//! This crate aggregates independently evaluated checks into a single
//! weighted system health score and state, and notifies subscribers
//! whenever a check or the system changes state.
//!
//! ## Key Components
//!
//! - [`State`]: ordered health states and their scores
//! - [`Check`]: capability every probe strategy implements
//! - [`Periodic`] / [`Stream`]: interval-polled and push-streamed checks
//! - [`Monitor`]: owns the checks, runs the aggregation loop, fans out
//!   transitions to subscribers
//! - [`HealthReport`]: snapshot suitable for rendering over HTTP
//!
//! ## Health Points
//!
//! Every check contributes `score(state) * weight` health points. The
//! system state is the bucket of `hp / total_weight`:
//!
//! | fraction      | state   |
//! |---------------|---------|
//! | `(0, 0.25]`   | outage  |
//! | `(0.25, 0.5]` | major   |
//! | `(0.5, 0.75]` | minor   |
//! | `(0.75, 1]`   | ok      |
//!
//! A check that has never reported contributes nothing. A monitor whose
//! checks all weigh zero stays `unknown`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vigil_health::{shutdown, Evaluation, Metadata, Monitor, Periodic, State};
//!
//! # async fn example() {
//! let database = Periodic::from_fn(
//!     Metadata::new("database", 10).with_runbook("https://runbooks/database"),
//!     Duration::from_secs(5),
//!     |_shutdown| async { Evaluation::new(State::Ok) },
//! )
//! .with_timeout(Duration::from_secs(1));
//!
//! let monitor = Monitor::new(vec![Arc::new(database)]);
//! let (mut reports, _unsubscribe) = monitor.subscribe();
//!
//! let (handle, signal) = shutdown::channel();
//! monitor.start(signal).unwrap();
//!
//! while let Some(report) = reports.recv().await {
//!     println!("{:?}", report);
//! }
//! handle.shutdown();
//! # }
//! ```

pub mod check;
pub mod clock;
pub mod config;
pub mod error;
pub mod monitor;
pub mod report;
pub mod shutdown;
pub mod state;

mod summary;

// Re-export main types
pub use check::{
    Check, CheckError, CheckResult, Evaluation, Metadata, Periodic, Probe, Report, Stream,
    StreamSource,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MonitorConfig;
pub use error::{HealthError, HealthResult, ProbeError};
pub use monitor::{Monitor, Unsubscribe};
pub use report::{CheckSnapshot, HealthReport};
pub use shutdown::{Shutdown, ShutdownHandle};
pub use state::State;
