//! Monitor configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a [`Monitor`](crate::Monitor).
///
/// Queue capacities are lower bounds: both queues always hold at least one
/// report per registered check plus one system report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Capacity of each subscriber queue.
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,

    /// Capacity of the queue between checks and the aggregation loop.
    #[serde(default)]
    pub report_queue_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
            report_queue_capacity: 0,
        }
    }
}

impl MonitorConfig {
    /// Subscriber queue capacity for a monitor with `checks` checks.
    pub fn subscriber_capacity_for(&self, checks: usize) -> usize {
        self.subscriber_capacity.max(checks + 1)
    }

    /// Report queue capacity for a monitor with `checks` checks.
    pub fn report_queue_capacity_for(&self, checks: usize) -> usize {
        self.report_queue_capacity.max(checks + 1)
    }
}

fn default_subscriber_capacity() -> usize {
    32
}
