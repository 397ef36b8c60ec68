//! Point-in-time projection of monitor state for external rendering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::check::{CheckResult, Metadata};
use crate::state::State;

/// Static capture of a check and its results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSnapshot {
    #[serde(flatten)]
    pub metadata: Metadata,

    /// Most recent result, `unknown` if never evaluated.
    pub last_check: CheckResult,

    /// Most recent result with a verdict, falling back to `last_check`.
    pub last_known_check: CheckResult,
}

/// Static capture of the system and every registered check.
///
/// Renders as `{state, currentHP, timestamp, results: {<name>: ...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(flatten)]
    pub system: CheckResult,

    pub results: BTreeMap<String, CheckSnapshot>,
}

impl HealthReport {
    /// Current system state.
    pub fn state(&self) -> State {
        self.system.state
    }

    /// Whether the system as a whole is down.
    pub fn is_outage(&self) -> bool {
        self.system.state == State::Outage
    }

    /// Snapshot for a single check.
    pub fn check(&self, name: &str) -> Option<&CheckSnapshot> {
        self.results.get(name)
    }
}
